//! GPU-facing seams: texture loading and the per-frame command contract.
//! The wgpu implementation lives in `gpu`; tests drive these with recorders.

use std::path::Path;

use corelib::TextureError;
use thiserror::Error;

use crate::shader::{ProgramHandle, UniformLocation};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u32);

/// Decodes an image and uploads it as a sampled 2D texture.
pub trait TextureLoader {
    fn load(&mut self, path: &Path) -> Result<TextureHandle, TextureError>;
}

/// One enabled attribute inside the bound vertex buffer (sizes in bytes).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub components: u32,
    pub stride: u32,
    pub offset: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec3([f32; 3]),
    /// Column-major.
    Mat4([f32; 16]),
}

impl UniformValue {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            UniformValue::Float(v) => bytemuck::bytes_of(v),
            UniformValue::Vec3(v) => bytemuck::cast_slice(v),
            UniformValue::Mat4(m) => bytemuck::cast_slice(m),
        }
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("GPU rejected the frame: {0}")]
    Gpu(String),

    #[error("a frame is already in flight")]
    FrameInFlight,

    #[error("{0} called outside a frame")]
    NotDrawing(&'static str),

    #[error("draw issued without a program")]
    NoProgram,

    #[error("unknown {kind} handle {index}")]
    UnknownHandle { kind: &'static str, index: u32 },
}

impl FrameError {
    /// Lost/outdated surfaces are fixed by reconfiguring; everything else is fatal.
    pub fn is_surface_lost(&self) -> bool {
        matches!(
            self,
            FrameError::Surface(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated)
        )
    }
}

/// Immediate-style frame commands, issued between `clear` and `present`.
pub trait FrameBackend {
    /// Takes ownership of the interleaved floats; the host copy is dropped after upload.
    fn upload_vertices(&mut self, data: Vec<f32>) -> BufferHandle;

    /// Start a frame: acquire the target and schedule color/depth clears.
    fn clear(&mut self, color: [f32; 4]) -> Result<(), FrameError>;

    fn use_program(&mut self, program: ProgramHandle) -> Result<(), FrameError>;

    fn bind_vertex_buffer(&mut self, buffer: BufferHandle) -> Result<(), FrameError>;

    /// Describe and enable one attribute of the bound buffer.
    fn enable_attribute(&mut self, attribute: VertexAttribute) -> Result<(), FrameError>;

    fn bind_texture(
        &mut self,
        location: UniformLocation,
        texture: TextureHandle,
    ) -> Result<(), FrameError>;

    fn set_uniform(
        &mut self,
        location: UniformLocation,
        value: UniformValue,
    ) -> Result<(), FrameError>;

    /// Non-indexed triangle list.
    fn draw_arrays(&mut self, first: u32, count: u32) -> Result<(), FrameError>;

    fn present(&mut self) -> Result<(), FrameError>;
}
