//! Recording stand-in for the GPU, used by the renderer's tests.

use std::{collections::HashMap, path::{Path, PathBuf}};

use corelib::{ShaderError, ShaderStage, TextureError};

use crate::{
    backend::{
        BufferHandle, FrameBackend, FrameError, TextureHandle, TextureLoader, UniformValue,
        VertexAttribute,
    },
    shader::{ProgramHandle, ResourceSlot, ShaderHandle, ShaderPipeline, UniformLocation},
};

#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Clear,
    UseProgram(ProgramHandle),
    BindVertexBuffer(BufferHandle),
    EnableAttribute(VertexAttribute),
    BindTexture(TextureHandle),
    SetUniform(UniformLocation, UniformValue),
    Draw { first: u32, count: u32 },
    Present,
}

pub struct RecordingGpu {
    pub calls: Vec<Call>,
    pub uploads: Vec<Vec<f32>>,
    pub loaded: Vec<PathBuf>,
    pub attributes: HashMap<&'static str, u32>,
    pub uniforms: HashMap<&'static str, UniformLocation>,
    /// Sources containing this marker fail to compile.
    pub reject_marker: Option<&'static str>,
    pub fail_link: bool,
    pub present_error: Option<fn() -> FrameError>,
    compiled: Vec<ShaderStage>,
}

pub fn block(offset: u32, size: u32) -> UniformLocation {
    UniformLocation::Block {
        slot: ResourceSlot {
            group: 0,
            binding: 0,
        },
        offset,
        size,
    }
}

impl RecordingGpu {
    /// Resolves the full binding contract, like the shipped shaders do.
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            uploads: Vec::new(),
            loaded: Vec::new(),
            attributes: HashMap::from([("a_position", 0), ("a_uv", 1), ("a_normal", 2)]),
            uniforms: HashMap::from([
                ("u_matrix", block(0, 64)),
                ("u_model", block(64, 64)),
                ("u_ambient", block(128, 12)),
                ("u_threshold", block(140, 4)),
                ("u_specular", block(144, 12)),
                ("u_diffuse", block(160, 12)),
                ("u_cam_pos", block(176, 12)),
                (
                    "u_texture",
                    UniformLocation::Texture(ResourceSlot {
                        group: 0,
                        binding: 1,
                    }),
                ),
            ]),
            reject_marker: None,
            fail_link: false,
            present_error: None,
            compiled: Vec::new(),
        }
    }

    pub fn uniform_values(&self) -> Vec<(UniformLocation, UniformValue)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::SetUniform(loc, value) => Some((*loc, *value)),
                _ => None,
            })
            .collect()
    }
}

impl ShaderPipeline for RecordingGpu {
    fn compile(&mut self, source: &str, stage: ShaderStage) -> Result<ShaderHandle, ShaderError> {
        if self.reject_marker.is_some_and(|m| source.contains(m)) {
            return Err(ShaderError::Compile {
                stage,
                diagnostic: format!("rejected {stage} source"),
            });
        }
        self.compiled.push(stage);
        Ok(ShaderHandle(self.compiled.len() as u32 - 1))
    }

    fn link(&mut self, _: ShaderHandle, _: ShaderHandle) -> Result<ProgramHandle, ShaderError> {
        if self.fail_link {
            return Err(ShaderError::Link {
                diagnostic: "interface mismatch".into(),
            });
        }
        Ok(ProgramHandle(7))
    }

    fn resolve_attribute(&self, _: ProgramHandle, name: &str) -> Option<u32> {
        self.attributes.get(name).copied()
    }

    fn resolve_uniform(&self, _: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.uniforms.get(name).copied()
    }
}

impl TextureLoader for RecordingGpu {
    fn load(&mut self, path: &Path) -> Result<TextureHandle, TextureError> {
        if path.to_string_lossy().contains("broken") {
            return Err(TextureError::Decode {
                path: path.to_path_buf(),
                message: "corrupt".into(),
            });
        }
        self.loaded.push(path.to_path_buf());
        Ok(TextureHandle(self.loaded.len() as u32 - 1))
    }
}

impl FrameBackend for RecordingGpu {
    fn upload_vertices(&mut self, data: Vec<f32>) -> BufferHandle {
        self.uploads.push(data);
        BufferHandle(self.uploads.len() as u32 - 1)
    }

    fn clear(&mut self, _: [f32; 4]) -> Result<(), FrameError> {
        self.calls.push(Call::Clear);
        Ok(())
    }

    fn use_program(&mut self, program: ProgramHandle) -> Result<(), FrameError> {
        self.calls.push(Call::UseProgram(program));
        Ok(())
    }

    fn bind_vertex_buffer(&mut self, buffer: BufferHandle) -> Result<(), FrameError> {
        self.calls.push(Call::BindVertexBuffer(buffer));
        Ok(())
    }

    fn enable_attribute(&mut self, attribute: VertexAttribute) -> Result<(), FrameError> {
        self.calls.push(Call::EnableAttribute(attribute));
        Ok(())
    }

    fn bind_texture(&mut self, _: UniformLocation, texture: TextureHandle) -> Result<(), FrameError> {
        self.calls.push(Call::BindTexture(texture));
        Ok(())
    }

    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue) -> Result<(), FrameError> {
        self.calls.push(Call::SetUniform(location, value));
        Ok(())
    }

    fn draw_arrays(&mut self, first: u32, count: u32) -> Result<(), FrameError> {
        self.calls.push(Call::Draw { first, count });
        Ok(())
    }

    fn present(&mut self) -> Result<(), FrameError> {
        self.calls.push(Call::Present);
        match self.present_error {
            Some(make) => Err(make()),
            None => Ok(()),
        }
    }
}
