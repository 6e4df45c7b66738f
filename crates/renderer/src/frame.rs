//! Frame renderer: owns resolved bindings and replays the per-frame sequence
//! (clear, program, attributes, texture, uniforms, draw, present).

use asset::{Material, VertexLayout};
use corelib::{
    ShaderError,
    camera::Camera,
    transform::{Bounds, Transform},
};
use glam::Mat4;

use crate::{
    backend::{BufferHandle, FrameBackend, FrameError, TextureHandle, UniformValue, VertexAttribute},
    shader::{ProgramHandle, ShaderPipeline, UniformLocation},
};

/// Binding names the shaders must use.
pub mod names {
    pub const A_POSITION: &str = "a_position";
    pub const A_UV: &str = "a_uv";
    pub const A_NORMAL: &str = "a_normal";

    pub const U_MATRIX: &str = "u_matrix";
    pub const U_MODEL: &str = "u_model";
    pub const U_TEXTURE: &str = "u_texture";
    pub const U_THRESHOLD: &str = "u_threshold";
    pub const U_AMBIENT: &str = "u_ambient";
    pub const U_SPECULAR: &str = "u_specular";
    pub const U_DIFFUSE: &str = "u_diffuse";
    pub const U_CAM_POS: &str = "u_cam_pos";
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Drawing,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Lighting {
    pub ambient: [f32; 3],
    pub specular: [f32; 3],
    pub diffuse: [f32; 3],
}

impl From<&Material> for Lighting {
    fn from(m: &Material) -> Self {
        Self {
            ambient: m.ambient,
            specular: m.specular,
            diffuse: m.diffuse,
        }
    }
}

impl Default for Lighting {
    fn default() -> Self {
        Self::from(&Material::default())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeBindings {
    pub position: u32,
    pub uv: Option<u32>,
    pub normal: Option<u32>,
}

impl AttributeBindings {
    /// Position is mandatory; UV and normal may be absent from the shader.
    pub fn resolve<S: ShaderPipeline + ?Sized>(
        shaders: &S,
        program: ProgramHandle,
    ) -> Result<Self, ShaderError> {
        let position = shaders
            .resolve_attribute(program, names::A_POSITION)
            .ok_or_else(|| ShaderError::BindingNotFound {
                name: names::A_POSITION.to_owned(),
            })?;
        Ok(Self {
            position,
            uv: optional(shaders.resolve_attribute(program, names::A_UV), names::A_UV),
            normal: optional(
                shaders.resolve_attribute(program, names::A_NORMAL),
                names::A_NORMAL,
            ),
        })
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UniformBindings {
    pub matrix: Option<UniformLocation>,
    pub model: Option<UniformLocation>,
    pub texture: Option<UniformLocation>,
    pub threshold: Option<UniformLocation>,
    pub ambient: Option<UniformLocation>,
    pub specular: Option<UniformLocation>,
    pub diffuse: Option<UniformLocation>,
    pub cam_pos: Option<UniformLocation>,
}

impl UniformBindings {
    /// Every uniform is optional: unresolved ones are skipped each frame.
    pub fn resolve<S: ShaderPipeline + ?Sized>(shaders: &S, program: ProgramHandle) -> Self {
        let get = |name| optional(shaders.resolve_uniform(program, name), name);
        Self {
            matrix: get(names::U_MATRIX),
            model: get(names::U_MODEL),
            texture: get(names::U_TEXTURE),
            threshold: get(names::U_THRESHOLD),
            ambient: get(names::U_AMBIENT),
            specular: get(names::U_SPECULAR),
            diffuse: get(names::U_DIFFUSE),
            cam_pos: get(names::U_CAM_POS),
        }
    }
}

fn optional<T>(found: Option<T>, name: &str) -> Option<T> {
    if found.is_none() {
        log::warn!("Shader binding '{name}' not found; it will not be set");
    }
    found
}

/// Everything resolved at startup that the loop needs.
#[derive(Clone, Debug)]
pub struct RenderContext {
    pub program: ProgramHandle,
    pub attributes: AttributeBindings,
    pub uniforms: UniformBindings,
    pub layout: VertexLayout,
    pub vertex_buffer: BufferHandle,
    pub vertex_count: u32,
    /// Object-space box of the uploaded positions; `None` for an empty mesh.
    pub bounds: Option<Bounds>,
    pub lighting: Lighting,
    /// Diffuse map of the lighting material, if it declared one.
    pub texture: Option<TextureHandle>,
    pub clear_color: [f32; 4],
}

/// Per-frame inputs.
#[derive(Clone, Copy, Debug)]
pub struct FrameParams {
    pub camera: Camera,
    pub model: Transform,
    pub threshold: f32,
}

pub struct FrameRenderer {
    ctx: RenderContext,
    state: FrameState,
}

impl FrameRenderer {
    pub fn new(ctx: RenderContext) -> Self {
        Self {
            ctx,
            state: FrameState::Idle,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    /// Attributes enabled each frame: position always, UV/normal only when
    /// the buffer carries them and the shader declares them.
    pub fn active_attributes(&self) -> Vec<VertexAttribute> {
        let layout = self.ctx.layout;
        let stride = layout.stride_bytes() as u32;
        let float = std::mem::size_of::<f32>() as u32;

        let mut out = vec![VertexAttribute {
            location: self.ctx.attributes.position,
            components: VertexLayout::POSITION_COMPONENTS as u32,
            stride,
            offset: 0,
        }];
        if let (Some(location), Some(offset)) = (self.ctx.attributes.uv, layout.uv_offset()) {
            out.push(VertexAttribute {
                location,
                components: VertexLayout::UV_COMPONENTS as u32,
                stride,
                offset: offset as u32 * float,
            });
        }
        if let (Some(location), Some(offset)) = (self.ctx.attributes.normal, layout.normal_offset()) {
            out.push(VertexAttribute {
                location,
                components: VertexLayout::NORMAL_COMPONENTS as u32,
                stride,
                offset: offset as u32 * float,
            });
        }
        out
    }

    /// Idle -> Drawing -> Idle. The state returns to Idle even when a step fails.
    pub fn render_frame<B: FrameBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        params: &FrameParams,
    ) -> Result<(), FrameError> {
        if self.state == FrameState::Drawing {
            return Err(FrameError::FrameInFlight);
        }

        backend.clear(self.ctx.clear_color)?;
        self.state = FrameState::Drawing;
        let result = self.record(backend, params).and_then(|()| backend.present());
        self.state = FrameState::Idle;
        result
    }

    fn record<B: FrameBackend + ?Sized>(
        &self,
        backend: &mut B,
        params: &FrameParams,
    ) -> Result<(), FrameError> {
        let ctx = &self.ctx;
        backend.use_program(ctx.program)?;

        backend.bind_vertex_buffer(ctx.vertex_buffer)?;
        for attribute in self.active_attributes() {
            backend.enable_attribute(attribute)?;
        }

        if let (Some(texture), Some(location)) = (ctx.texture, ctx.uniforms.texture) {
            backend.bind_texture(location, texture)?;
        }

        let model = params.model.matrix();
        let combined = params.camera.proj_view() * model;
        let u = &ctx.uniforms;
        let values = [
            (u.cam_pos, UniformValue::Vec3(params.camera.position.to_array())),
            (u.threshold, UniformValue::Float(params.threshold)),
            (u.ambient, UniformValue::Vec3(ctx.lighting.ambient)),
            (u.specular, UniformValue::Vec3(ctx.lighting.specular)),
            (u.diffuse, UniformValue::Vec3(ctx.lighting.diffuse)),
            (u.matrix, mat4(combined)),
            (u.model, mat4(model)),
        ];
        for (location, value) in values {
            if let Some(location) = location {
                backend.set_uniform(location, value)?;
            }
        }

        backend.draw_arrays(0, ctx.vertex_count)
    }
}

fn mat4(m: Mat4) -> UniformValue {
    UniformValue::Mat4(m.to_cols_array())
}
