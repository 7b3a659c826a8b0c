//! 缓冲区
//!
//! 顶点、索引和常量缓冲区。所有类型都是共享所有权的句柄：克隆只增加引用计数，
//! 最后一个句柄释放时原生缓冲区随之释放。

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::core::error::{Result, RhiError};
use crate::rhi::backend::Backend;
use crate::rhi::device::{logged, Device};
use crate::rhi::types::{BufferDesc, BufferKind, IndexFormat, IndexType, ResourceId, ResourceUsage};
use crate::rhi_debug;

struct BufferInner<B: Backend> {
    id: ResourceId,
    label: String,
    desc: BufferDesc,
    native: B::Buffer,
    backend: Rc<B>,
}

impl<B: Backend> Drop for BufferInner<B> {
    fn drop(&mut self) {
        rhi_debug!(id = %self.id, label = %self.label, "Buffer released");
    }
}

/// 无类型缓冲区句柄
pub struct Buffer<B: Backend> {
    inner: Rc<BufferInner<B>>,
}

impl<B: Backend> Clone for Buffer<B> {
    fn clone(&self) -> Self {
        Self { inner: Rc::clone(&self.inner) }
    }
}

impl<B: Backend> fmt::Debug for Buffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("id", &self.inner.id)
            .field("label", &self.inner.label)
            .field("desc", &self.inner.desc)
            .finish()
    }
}

impl<B: Backend> Buffer<B> {
    fn create(device: &Device<B>, label: &str, desc: BufferDesc, data: Option<&[u8]>) -> Result<Self> {
        desc.validate(data.is_some())?;
        if let Some(data) = data {
            if data.len() > desc.size as usize {
                return Err(RhiError::invalid(format!(
                    "initial data ({} bytes) exceeds buffer size ({} bytes)",
                    data.len(),
                    desc.size
                )));
            }
        }

        let native = logged(
            "create buffer",
            label,
            device.backend().create_buffer(&desc, data),
        )?;
        let id = device.next_id();
        rhi_debug!(id = %id, label, kind = ?desc.kind, size = desc.size, "Buffer created");

        Ok(Self {
            inner: Rc::new(BufferInner {
                id,
                label: label.to_string(),
                desc,
                native,
                backend: device.shared_backend(),
            }),
        })
    }

    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn desc(&self) -> &BufferDesc {
        &self.inner.desc
    }

    pub fn native(&self) -> &B::Buffer {
        &self.inner.native
    }

    /// 当前存活的句柄数量
    pub fn handle_count(&self) -> usize {
        Rc::strong_count(&self.inner)
    }

    /// 覆盖写入缓冲区开头的字节
    pub fn write_bytes(&self, data: &[u8]) -> Result<()> {
        let desc = &self.inner.desc;
        if desc.usage == ResourceUsage::Immutable {
            return Err(RhiError::invalid(format!("buffer '{}' is immutable", self.inner.label)));
        }
        if data.len() > desc.size as usize {
            return Err(RhiError::invalid(format!(
                "update of {} bytes exceeds buffer '{}' size ({} bytes)",
                data.len(),
                self.inner.label,
                desc.size
            )));
        }
        logged(
            "update buffer",
            &self.inner.label,
            self.inner.backend.write_buffer(&self.inner.native, desc, data),
        )
    }
}

/// 顶点缓冲区
pub struct VertexBuffer<B: Backend> {
    buffer: Buffer<B>,
    vertex_count: u32,
}

impl<B: Backend> Clone for VertexBuffer<B> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            vertex_count: self.vertex_count,
        }
    }
}

impl<B: Backend> fmt::Debug for VertexBuffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VertexBuffer")
            .field("buffer", &self.buffer)
            .field("vertex_count", &self.vertex_count)
            .finish()
    }
}

impl<B: Backend> VertexBuffer<B> {
    pub(crate) fn create<V: bytemuck::Pod>(
        device: &Device<B>,
        label: &str,
        vertices: &[V],
        usage: ResourceUsage,
    ) -> Result<Self> {
        let stride = std::mem::size_of::<V>() as u32;
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let desc = BufferDesc::new(BufferKind::Vertex, usage, bytes.len() as u32, stride);
        let buffer = Buffer::create(device, label, desc, Some(bytes))?;
        Ok(Self {
            buffer,
            vertex_count: vertices.len() as u32,
        })
    }

    /// 创建不带初始数据的动态顶点缓冲区
    pub fn with_capacity<V: bytemuck::Pod>(device: &Device<B>, label: &str, capacity: u32) -> Result<Self> {
        let stride = std::mem::size_of::<V>() as u32;
        let size = stride.checked_mul(capacity).ok_or_else(|| {
            RhiError::invalid(format!(
                "vertex buffer '{}' of {} x {} bytes is too large",
                label, capacity, stride
            ))
        })?;
        let desc = BufferDesc::new(BufferKind::Vertex, ResourceUsage::Dynamic, size, stride);
        let buffer = Buffer::create(device, label, desc, None)?;
        Ok(Self { buffer, vertex_count: capacity })
    }

    /// 覆盖写入开头的顶点
    pub fn update<V: bytemuck::Pod>(&self, vertices: &[V]) -> Result<()> {
        if std::mem::size_of::<V>() as u32 != self.stride() {
            return Err(RhiError::invalid(format!(
                "vertex size {} does not match buffer stride {}",
                std::mem::size_of::<V>(),
                self.stride()
            )));
        }
        self.buffer.write_bytes(bytemuck::cast_slice(vertices))
    }

    pub fn buffer(&self) -> &Buffer<B> {
        &self.buffer
    }

    pub fn id(&self) -> ResourceId {
        self.buffer.id()
    }

    pub fn stride(&self) -> u32 {
        self.buffer.desc().stride
    }

    /// 缓冲区能容纳的顶点数
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

/// 索引缓冲区
pub struct IndexBuffer<B: Backend> {
    buffer: Buffer<B>,
    format: IndexFormat,
    index_count: u32,
}

impl<B: Backend> Clone for IndexBuffer<B> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            format: self.format,
            index_count: self.index_count,
        }
    }
}

impl<B: Backend> fmt::Debug for IndexBuffer<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexBuffer")
            .field("buffer", &self.buffer)
            .field("format", &self.format)
            .field("index_count", &self.index_count)
            .finish()
    }
}

impl<B: Backend> IndexBuffer<B> {
    pub(crate) fn create<I: IndexType>(
        device: &Device<B>,
        label: &str,
        indices: &[I],
        usage: ResourceUsage,
    ) -> Result<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(indices);
        let desc = BufferDesc::new(BufferKind::Index, usage, bytes.len() as u32, I::FORMAT.size());
        let buffer = Buffer::create(device, label, desc, Some(bytes))?;
        Ok(Self {
            buffer,
            format: I::FORMAT,
            index_count: indices.len() as u32,
        })
    }

    /// 覆盖写入开头的索引，索引类型必须与创建时一致
    pub fn update<I: IndexType>(&self, indices: &[I]) -> Result<()> {
        if I::FORMAT != self.format {
            return Err(RhiError::invalid(format!(
                "index format {:?} does not match buffer format {:?}",
                I::FORMAT,
                self.format
            )));
        }
        self.buffer.write_bytes(bytemuck::cast_slice(indices))
    }

    pub fn buffer(&self) -> &Buffer<B> {
        &self.buffer
    }

    pub fn id(&self) -> ResourceId {
        self.buffer.id()
    }

    pub fn format(&self) -> IndexFormat {
        self.format
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// 类型化的常量缓冲区
///
/// 总是动态缓冲区，大小向上对齐到 16 字节，补齐部分写零。
pub struct ConstantBuffer<B: Backend, T: bytemuck::Pod> {
    buffer: Buffer<B>,
    _marker: PhantomData<T>,
}

impl<B: Backend, T: bytemuck::Pod> Clone for ConstantBuffer<B, T> {
    fn clone(&self) -> Self {
        Self {
            buffer: self.buffer.clone(),
            _marker: PhantomData,
        }
    }
}

impl<B: Backend, T: bytemuck::Pod> fmt::Debug for ConstantBuffer<B, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantBuffer").field("buffer", &self.buffer).finish()
    }
}

impl<B: Backend, T: bytemuck::Pod> ConstantBuffer<B, T> {
    pub(crate) fn create(device: &Device<B>, label: &str, initial: &T) -> Result<Self> {
        let size = std::mem::size_of::<T>() as u32;
        let desc = BufferDesc::new(BufferKind::Constant, ResourceUsage::Dynamic, size, size);
        let bytes = padded_bytes(initial, desc.size);
        let buffer = Buffer::create(device, label, desc, Some(&bytes))?;
        Ok(Self {
            buffer,
            _marker: PhantomData,
        })
    }

    pub fn update(&self, value: &T) -> Result<()> {
        let bytes = padded_bytes(value, self.buffer.desc().size);
        self.buffer.write_bytes(&bytes)
    }

    pub fn buffer(&self) -> &Buffer<B> {
        &self.buffer
    }

    pub fn id(&self) -> ResourceId {
        self.buffer.id()
    }
}

fn padded_bytes<T: bytemuck::Pod>(value: &T, size: u32) -> Vec<u8> {
    let raw = bytemuck::bytes_of(value);
    let mut bytes = vec![0u8; size as usize];
    bytes[..raw.len()].copy_from_slice(raw);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::GraphicsError;
    use crate::gfx::headless::{Call, HeadlessBackend, ObjectKind};
    use bytemuck::{Pod, Zeroable};

    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    struct Vertex {
        position: [f32; 3],
        uv: [f32; 2],
    }

    #[repr(C)]
    #[derive(Clone, Copy, Pod, Zeroable)]
    struct Tint {
        color: [f32; 3],
    }

    fn device() -> Device<HeadlessBackend> {
        Device::new(HeadlessBackend::new(64, 64))
    }

    fn quad() -> [Vertex; 4] {
        [Vertex { position: [0.0; 3], uv: [0.0; 2] }; 4]
    }

    #[test]
    fn test_vertex_buffer_stride_and_count() {
        let device = device();
        let vb = device.create_vertex_buffer("quad", &quad(), ResourceUsage::Immutable).unwrap();
        assert_eq!(vb.stride(), 20);
        assert_eq!(vb.vertex_count(), 4);
        assert_eq!(vb.buffer().desc().size, 80);
    }

    #[test]
    fn test_immutable_buffer_rejects_update() {
        let device = device();
        let vb = device.create_vertex_buffer("quad", &quad(), ResourceUsage::Immutable).unwrap();
        let err = vb.update(&quad()).unwrap_err();
        assert!(matches!(err.graphics(), Some(GraphicsError::InvalidDescriptor(_))));
    }

    #[test]
    fn test_oversized_update_is_rejected() {
        let device = device();
        let vb = VertexBuffer::with_capacity::<Vertex>(&device, "stream", 2).unwrap();
        assert!(vb.update(&quad()[..2]).is_ok());
        assert!(vb.update(&quad()).is_err());
        assert!(vb.update(&[0u32; 2]).is_err());
    }

    #[test]
    fn test_capacity_overflow_is_rejected() {
        let device = device();
        let err = VertexBuffer::with_capacity::<Vertex>(&device, "stream", u32::MAX / 4).unwrap_err();
        assert!(matches!(err.graphics(), Some(GraphicsError::InvalidDescriptor(_))));
        assert_eq!(device.backend().created_objects(ObjectKind::Buffer), 0);
    }

    #[test]
    fn test_index_buffer_format_is_checked() {
        let device = device();
        let ib = device
            .create_index_buffer("indices", &[0u16, 1, 2, 2, 1, 3], ResourceUsage::Default)
            .unwrap();
        assert_eq!(ib.format(), IndexFormat::U16);
        assert_eq!(ib.index_count(), 6);
        assert!(ib.update(&[3u16, 2, 1]).is_ok());
        assert!(ib.update(&[3u32, 2, 1]).is_err());
    }

    #[test]
    fn test_constant_buffer_is_padded() {
        let device = device();
        let cb = device.create_constant_buffer("tint", &Tint { color: [1.0; 3] }).unwrap();
        assert_eq!(cb.buffer().desc().size, 16);
        assert_eq!(cb.buffer().desc().usage, ResourceUsage::Dynamic);

        cb.update(&Tint { color: [0.5; 3] }).unwrap();
        let writes: Vec<Call> = device
            .backend()
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::WriteBuffer { .. }))
            .collect();
        assert_eq!(writes, vec![Call::WriteBuffer { buffer: cb.buffer().native().id, len: 16 }]);
    }

    #[test]
    fn test_native_buffer_released_with_last_handle() {
        let device = device();
        let vb = device.create_vertex_buffer("quad", &quad(), ResourceUsage::Default).unwrap();
        let copy = vb.clone();
        assert_eq!(vb.buffer().handle_count(), 2);
        assert_eq!(device.backend().live_objects(ObjectKind::Buffer), 1);

        drop(vb);
        assert_eq!(device.backend().live_objects(ObjectKind::Buffer), 1);
        drop(copy);
        assert_eq!(device.backend().live_objects(ObjectKind::Buffer), 0);
    }

    #[test]
    fn test_native_failure_is_propagated() {
        let device = device();
        device.backend().fail_creation(ObjectKind::Buffer);
        let err = device
            .create_vertex_buffer("quad", &quad(), ResourceUsage::Default)
            .unwrap_err();
        assert!(matches!(err.graphics(), Some(GraphicsError::ResourceCreation(_))));
    }

    #[test]
    fn test_empty_buffer_is_rejected() {
        let device = device();
        let empty: [Vertex; 0] = [];
        assert!(device.create_vertex_buffer("empty", &empty, ResourceUsage::Default).is_err());
    }
}
