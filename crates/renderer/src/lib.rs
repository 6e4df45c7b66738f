//! Renderer: shader pipeline, per-frame renderer and the wgpu backend behind them.
//! wgpu 26, winit 0.30

pub mod backend;
pub mod frame;
pub mod gpu;
pub mod setup;
pub mod shader;

#[cfg(test)]
mod mock;

pub use backend::{BufferHandle, FrameBackend, FrameError, TextureHandle, TextureLoader};
pub use frame::{FrameParams, FrameRenderer, FrameState, RenderContext};
pub use gpu::{GpuState, TextureConfig};
pub use setup::{ScenePaths, prepare_scene};
pub use shader::{NagaShaderPipeline, ProgramHandle, ShaderPipeline, UniformLocation};
