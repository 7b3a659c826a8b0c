/// Build script for DistRHI
///
/// HLSL 在运行时通过 D3DCompile 编译，这里只负责在着色器改动时触发重新构建
/// （`main.rs` 用 `include_str!` 内嵌着色器源码）。
fn main() {
    println!("cargo:rerun-if-changed=shaders/textured.hlsl");
}
