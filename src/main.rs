//! DistRHI 演示程序
//!
//! 绘制一个旋转的带纹理四边形。Windows 上默认打开窗口走 D3D11 后端，
//! 其他平台（或 `--headless`）使用记录后端跑固定帧数，并输出每帧的绑定统计。
//!
//! # 使用方法
//!
//! ```bash
//! # 使用配置文件
//! cargo run
//!
//! # 无窗口运行 10 帧
//! cargo run -- --headless --frames 10
//! ```

use anyhow::Context;
use bytemuck::{Pod, Zeroable};
use nalgebra::{Matrix4, Vector3};
use tracing::info;

use dist_rhi::core::{log, Config};
use dist_rhi::gfx::HeadlessBackend;
use dist_rhi::rhi::state::{BlendDesc, RenderTargetBlendDesc, SamplerDesc};
use dist_rhi::rhi::{
    Backend, CommandQueue, ConstantBuffer, DepthStencil, Device, HlslSource, IndexBuffer, LoadOp,
    Pipeline, PipelineDesc, PixelFormat, PrimitiveTopology, RenderPass, ResourceUsage, Sampler,
    ShaderSource, ShaderStage, Swapchain, Texture2D, VertexBuffer, VertexFormat, VertexLayout,
};

const SHADER: &str = include_str!("../shaders/textured.hlsl");
const CLEAR_COLOR: [f32; 4] = [0.08, 0.09, 0.12, 1.0];
const CHECKER_SIZE: u32 = 64;

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct QuadVertex {
    position: [f32; 3],
    uv: [f32; 2],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct QuadConstants {
    transform: [[f32; 4]; 4],
    tint: [f32; 4],
}

const QUAD_VERTICES: [QuadVertex; 4] = [
    QuadVertex { position: [-0.5, -0.5, 0.5], uv: [0.0, 1.0] },
    QuadVertex { position: [-0.5, 0.5, 0.5], uv: [0.0, 0.0] },
    QuadVertex { position: [0.5, 0.5, 0.5], uv: [1.0, 0.0] },
    QuadVertex { position: [0.5, -0.5, 0.5], uv: [1.0, 1.0] },
];

const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// 8x8 格子的棋盘纹理
fn checker_pixels(size: u32) -> Vec<u8> {
    let cell = (size / 8).max(1);
    (0..size * size)
        .flat_map(|i| {
            let (x, y) = (i % size, i / size);
            if (x / cell + y / cell) % 2 == 0 {
                [235, 235, 235, 255]
            } else {
                [40, 110, 200, 255]
            }
        })
        .collect()
}

/// 演示场景
struct QuadScene<B: Backend> {
    device: Device<B>,
    swapchain: Swapchain<B>,
    queue: CommandQueue<B>,
    pipeline: Pipeline<B>,
    vertices: VertexBuffer<B>,
    indices: IndexBuffer<B>,
    constants: ConstantBuffer<B, QuadConstants>,
    texture: Texture2D<B>,
    sampler: Sampler<B>,
    depth: DepthStencil<B>,
    vsync: bool,
}

impl<B: Backend> QuadScene<B> {
    fn new(device: Device<B>, vsync: bool) -> anyhow::Result<Self> {
        let vs_source = ShaderSource::Hlsl(HlslSource::new(SHADER, "vs_main").with_file_name("textured.hlsl"));
        let ps_source = ShaderSource::Hlsl(HlslSource::new(SHADER, "ps_main").with_file_name("textured.hlsl"));
        let vertex_shader = device.create_vertex_shader("textured vs", &vs_source)?;
        let pixel_shader = device.create_pixel_shader("textured ps", &ps_source)?;

        let layout = VertexLayout::new()
            .with("POSITION", 0, VertexFormat::Float3)
            .with("TEXCOORD", 0, VertexFormat::Float2);
        let input_layout = device.create_input_layout("quad layout", &layout, &vertex_shader)?;

        let pipeline = device.create_pipeline(
            PipelineDesc::new("textured quad", vertex_shader, pixel_shader)
                .with_input_layout(input_layout)
                .with_topology(PrimitiveTopology::TriangleList)
                .with_blend(BlendDesc::uniform(RenderTargetBlendDesc::alpha_blend())),
        );

        let swapchain = device.create_swapchain()?;
        let depth = device.create_depth_stencil(
            "scene depth",
            swapchain.width(),
            swapchain.height(),
            PixelFormat::Depth32Float,
        )?;

        let vertices = device.create_vertex_buffer("quad vertices", &QUAD_VERTICES, ResourceUsage::Immutable)?;
        let indices = device.create_index_buffer("quad indices", &QUAD_INDICES, ResourceUsage::Immutable)?;
        let constants = device.create_constant_buffer(
            "quad constants",
            &QuadConstants {
                transform: Matrix4::<f32>::identity().into(),
                tint: [1.0; 4],
            },
        )?;
        let texture = Texture2D::from_rgba8(
            &device,
            "checker",
            CHECKER_SIZE,
            CHECKER_SIZE,
            &checker_pixels(CHECKER_SIZE),
            false,
        )?;
        let sampler = device.create_sampler("point clamp", SamplerDesc::point_clamp())?;
        let queue = device.create_command_queue();

        info!(width = swapchain.width(), height = swapchain.height(), "Quad scene ready");
        Ok(Self {
            device,
            swapchain,
            queue,
            pipeline,
            vertices,
            indices,
            constants,
            texture,
            sampler,
            depth,
            vsync,
        })
    }

    fn render(&mut self, time: f32) -> anyhow::Result<()> {
        let aspect = self.swapchain.width() as f32 / self.swapchain.height().max(1) as f32;
        let transform = Matrix4::new_nonuniform_scaling(&Vector3::new(1.0 / aspect, 1.0, 1.0))
            * Matrix4::from_euler_angles(0.0, 0.0, time);
        let pulse = 0.75 + 0.25 * (time * 2.0).sin();
        self.constants.update(&QuadConstants {
            transform: transform.into(),
            tint: [1.0, 1.0, 1.0, pulse],
        })?;

        // 通道持有后备缓冲区句柄，必须在 resize 前释放
        let pass = RenderPass::new("main")
            .with_color(self.swapchain.render_target()?, LoadOp::Clear(CLEAR_COLOR))
            .with_depth(&self.depth, LoadOp::Clear(1.0), LoadOp::Load);

        self.queue.begin_render_pass(&pass)?;
        self.queue.set_pipeline(&mut self.pipeline)?;
        self.queue.set_vertex_buffer(0, &self.vertices);
        self.queue.set_index_buffer(&self.indices);
        self.queue.set_constant_buffer(ShaderStage::Vertex, 0, &self.constants)?;
        self.queue.set_texture(ShaderStage::Pixel, 0, &self.texture)?;
        self.queue.set_sampler(ShaderStage::Pixel, 0, &self.sampler)?;
        self.queue.draw_indexed(self.indices.index_count(), 0, 0)?;
        self.queue.end_render_pass()?;

        self.swapchain.present(self.vsync)?;
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) -> anyhow::Result<()> {
        if self.swapchain.resize(width, height)? {
            self.depth = self
                .device
                .create_depth_stencil("scene depth", width, height, PixelFormat::Depth32Float)?;
        }
        Ok(())
    }
}

/// 无窗口运行固定帧数；中途把表面缩小一半以走一遍 resize 路径
fn run_headless(config: &Config) -> anyhow::Result<()> {
    let backend = HeadlessBackend::new(config.window.width, config.window.height);
    let mut scene = QuadScene::new(Device::new(backend), config.graphics.vsync)?;

    let frames = config.graphics.headless_frames;
    for frame in 0..frames {
        if frame > 0 && frame == frames / 2 {
            scene.resize(config.window.width / 2, config.window.height / 2)?;
        }
        scene
            .render(frame as f32 / 60.0)
            .with_context(|| format!("frame {} failed", frame))?;
        let stats = scene.queue.take_stats();
        info!(
            frame,
            draws = stats.draw_calls,
            srv_binds = stats.srv_binds,
            srv_skipped = stats.srv_binds_skipped,
            state_binds = stats.state_binds,
            "Frame recorded"
        );
    }

    let backend = scene.device.backend();
    info!(calls = backend.calls().len(), "Headless run finished");
    Ok(())
}

#[cfg(target_os = "windows")]
fn run_windowed(config: &Config) -> anyhow::Result<()> {
    use dist_rhi::gfx::D3D11Backend;
    use std::time::Instant;
    use tracing::error;
    use winit::event::{Event, WindowEvent};
    use winit::event_loop::{ControlFlow, EventLoop};
    use winit::window::WindowBuilder;

    let event_loop = EventLoop::new()?;
    let window = WindowBuilder::new()
        .with_title(config.window.title.as_str())
        .with_inner_size(winit::dpi::PhysicalSize::new(config.window.width, config.window.height))
        .with_resizable(config.window.resizable)
        .build(&event_loop)?;

    let size = window.inner_size();
    let backend = D3D11Backend::new(&window, size.width, size.height, &config.graphics)?;
    let mut scene = QuadScene::new(Device::new(backend), config.graphics.vsync)?;
    let start = Instant::now();

    info!("Entering main loop...");
    event_loop.run(move |event, elwt| {
        elwt.set_control_flow(ControlFlow::Poll);
        match event {
            Event::WindowEvent { event, .. } => match event {
                WindowEvent::CloseRequested => {
                    info!("Close requested, shutting down...");
                    elwt.exit();
                }
                WindowEvent::Resized(size) => {
                    if let Err(e) = scene.resize(size.width, size.height) {
                        error!("Resize failed: {:#}", e);
                        elwt.exit();
                    }
                }
                WindowEvent::RedrawRequested => {
                    if let Err(e) = scene.render(start.elapsed().as_secs_f32()) {
                        error!("Draw failed: {:#}", e);
                        elwt.exit();
                    }
                    scene.queue.take_stats();
                }
                _ => (),
            },
            Event::AboutToWait => window.request_redraw(),
            _ => (),
        }
    })?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let mut config = Config::from_file_or_default("config.toml");
    config.apply_args(std::env::args());
    config.validate().context("invalid configuration")?;

    let log_file = config.logging.file_output.then_some(config.logging.log_file.as_str());
    log::init_logger(config.logging.level, config.logging.file_output, log_file)?;
    info!(version = env!("CARGO_PKG_VERSION"), backend = config.graphics.backend.name(), "DistRHI starting");

    if config.graphics.backend.is_d3d11() {
        #[cfg(target_os = "windows")]
        return run_windowed(&config);
        #[cfg(not(target_os = "windows"))]
        tracing::warn!("Direct3D 11 is only available on Windows, falling back to headless");
    }
    run_headless(&config)
}
