//! Shader pipeline: WGSL compile/validate with naga, program linking and
//! name-based attribute/uniform lookup by reflection.

use std::collections::{BTreeMap, HashMap};

use corelib::{ShaderError, ShaderStage};
use naga::{
    AddressSpace, Binding, Handle, Module, Type, TypeInner,
    valid::{Capabilities, ValidationFlags, Validator},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ProgramHandle(pub u32);

/// `@group(g) @binding(b)` pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceSlot {
    pub group: u32,
    pub binding: u32,
}

/// Where a uniform name lives in a linked program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UniformLocation {
    /// Byte range inside the uniform block bound at `slot`.
    Block {
        slot: ResourceSlot,
        offset: u32,
        size: u32,
    },
    Texture(ResourceSlot),
    Sampler(ResourceSlot),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    UniformBlock { size: u32 },
    Texture,
    Sampler,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceInfo {
    pub name: String,
    pub slot: ResourceSlot,
    pub kind: ResourceKind,
}

/// A vertex-stage input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeInfo {
    pub name: String,
    pub location: u32,
    pub components: u32,
}

/// The compile/link/resolve contract. Lookups return `None` for unknown
/// names; callers decide whether that is fatal.
pub trait ShaderPipeline {
    fn compile(&mut self, source: &str, stage: ShaderStage) -> Result<ShaderHandle, ShaderError>;

    fn link(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, ShaderError>;

    fn resolve_attribute(&self, program: ProgramHandle, name: &str) -> Option<u32>;

    fn resolve_uniform(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation>;
}

pub struct CompiledShader {
    stage: ShaderStage,
    source: String,
    entry_point: String,
    module: Module,
}

impl CompiledShader {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }
}

#[derive(Clone, Debug)]
pub struct LinkedProgram {
    pub vertex: ShaderHandle,
    pub fragment: ShaderHandle,
    pub attributes: Vec<AttributeInfo>,
    /// Sorted by slot.
    pub resources: Vec<ResourceInfo>,
    uniforms: HashMap<String, UniformLocation>,
}

/// CPU-only implementation; the GPU backend wraps it and adds modules/layouts.
#[derive(Default)]
pub struct NagaShaderPipeline {
    shaders: Vec<CompiledShader>,
    programs: Vec<LinkedProgram>,
}

impl NagaShaderPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shader(&self, handle: ShaderHandle) -> Option<&CompiledShader> {
        self.shaders.get(handle.0 as usize)
    }

    pub fn program(&self, handle: ProgramHandle) -> Option<&LinkedProgram> {
        self.programs.get(handle.0 as usize)
    }

    fn shader_for(
        &self,
        handle: ShaderHandle,
        stage: ShaderStage,
    ) -> Result<&CompiledShader, ShaderError> {
        let shader = self
            .shader(handle)
            .ok_or(ShaderError::UnknownHandle(handle.0))?;
        if shader.stage != stage {
            return Err(link_error(format!(
                "shader {} is a {} shader, expected {stage}",
                handle.0, shader.stage
            )));
        }
        Ok(shader)
    }
}

impl ShaderPipeline for NagaShaderPipeline {
    fn compile(&mut self, source: &str, stage: ShaderStage) -> Result<ShaderHandle, ShaderError> {
        let compile_error = |diagnostic: String| ShaderError::Compile { stage, diagnostic };

        let module = naga::front::wgsl::parse_str(source)
            .map_err(|e| compile_error(e.emit_to_string(source)))?;
        Validator::new(ValidationFlags::all(), Capabilities::all())
            .validate(&module)
            .map_err(|e| compile_error(e.emit_to_string(source)))?;

        let entry_point = module
            .entry_points
            .iter()
            .find(|ep| ep.stage == naga_stage(stage))
            .map(|ep| ep.name.clone())
            .ok_or_else(|| compile_error(format!("no @{stage} entry point")))?;

        let handle = ShaderHandle(self.shaders.len() as u32);
        log::debug!("Compiled {stage} shader {} (entry '{entry_point}')", handle.0);
        self.shaders.push(CompiledShader {
            stage,
            source: source.to_owned(),
            entry_point,
            module,
        });
        Ok(handle)
    }

    fn link(
        &mut self,
        vertex: ShaderHandle,
        fragment: ShaderHandle,
    ) -> Result<ProgramHandle, ShaderError> {
        let vs = self.shader_for(vertex, ShaderStage::Vertex)?;
        let fs = self.shader_for(fragment, ShaderStage::Fragment)?;

        // Every fragment input must be written by the vertex stage with the same type.
        let outputs = stage_outputs(vs);
        for input in stage_inputs(fs) {
            let ty = &fs.module.types[input.ty].inner;
            match outputs.iter().find(|o| o.location == input.location) {
                None => {
                    return Err(link_error(format!(
                        "fragment input '{}' at location {} is not written by the vertex stage",
                        input.name, input.location
                    )));
                }
                Some(out) if vs.module.types[out.ty].inner != *ty => {
                    return Err(link_error(format!(
                        "location {} is {} in the vertex stage but {} in the fragment stage",
                        input.location,
                        type_name(&vs.module, out.ty),
                        type_name(&fs.module, input.ty)
                    )));
                }
                Some(_) => {}
            }
        }

        let mut resources: BTreeMap<ResourceSlot, ResourceInfo> = BTreeMap::new();
        let mut uniforms: HashMap<String, UniformLocation> = HashMap::new();
        for shader in [vs, fs] {
            for (resource, names) in reflect_resources(&shader.module) {
                if let Some(existing) = resources.get(&resource.slot) {
                    if *existing != resource {
                        return Err(link_error(format!(
                            "group {} binding {} is '{}' in one stage and '{}' in the other",
                            resource.slot.group, resource.slot.binding, existing.name, resource.name
                        )));
                    }
                }
                for (name, location) in names {
                    if let Some(previous) = uniforms.insert(name.clone(), location) {
                        if previous != location {
                            return Err(link_error(format!(
                                "uniform '{name}' resolves differently in the two stages"
                            )));
                        }
                    }
                }
                resources.insert(resource.slot, resource);
            }
        }

        let attributes = stage_inputs(vs)
            .into_iter()
            .map(|input| AttributeInfo {
                components: components(&vs.module, input.ty),
                name: input.name,
                location: input.location,
            })
            .collect();

        let handle = ProgramHandle(self.programs.len() as u32);
        self.programs.push(LinkedProgram {
            vertex,
            fragment,
            attributes,
            resources: resources.into_values().collect(),
            uniforms,
        });
        log::info!("Linked shader program {}", handle.0);
        Ok(handle)
    }

    fn resolve_attribute(&self, program: ProgramHandle, name: &str) -> Option<u32> {
        self.program(program)?
            .attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.location)
    }

    fn resolve_uniform(&self, program: ProgramHandle, name: &str) -> Option<UniformLocation> {
        self.program(program)?.uniforms.get(name).copied()
    }
}

fn link_error(diagnostic: String) -> ShaderError {
    ShaderError::Link { diagnostic }
}

fn naga_stage(stage: ShaderStage) -> naga::ShaderStage {
    match stage {
        ShaderStage::Vertex => naga::ShaderStage::Vertex,
        ShaderStage::Fragment => naga::ShaderStage::Fragment,
    }
}

struct StageVarying {
    name: String,
    location: u32,
    ty: Handle<Type>,
}

fn entry_point(shader: &CompiledShader) -> Option<&naga::EntryPoint> {
    shader
        .module
        .entry_points
        .iter()
        .find(|ep| ep.name == shader.entry_point)
}

/// Location-bound values, looking through one level of struct wrapping.
fn collect_varyings(
    module: &Module,
    name: Option<&String>,
    binding: Option<&Binding>,
    ty: Handle<Type>,
    out: &mut Vec<StageVarying>,
) {
    match binding {
        Some(Binding::Location { location, .. }) => out.push(StageVarying {
            name: name.cloned().unwrap_or_default(),
            location: *location,
            ty,
        }),
        Some(Binding::BuiltIn(_)) => {}
        None => {
            if let TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    if let Some(Binding::Location { location, .. }) = &member.binding {
                        out.push(StageVarying {
                            name: member.name.clone().unwrap_or_default(),
                            location: *location,
                            ty: member.ty,
                        });
                    }
                }
            }
        }
    }
}

fn stage_inputs(shader: &CompiledShader) -> Vec<StageVarying> {
    let mut out = Vec::new();
    if let Some(ep) = entry_point(shader) {
        for arg in &ep.function.arguments {
            collect_varyings(
                &shader.module,
                arg.name.as_ref(),
                arg.binding.as_ref(),
                arg.ty,
                &mut out,
            );
        }
    }
    out
}

fn stage_outputs(shader: &CompiledShader) -> Vec<StageVarying> {
    let mut out = Vec::new();
    if let Some(result) = entry_point(shader).and_then(|ep| ep.function.result.as_ref()) {
        collect_varyings(
            &shader.module,
            None,
            result.binding.as_ref(),
            result.ty,
            &mut out,
        );
    }
    out
}

/// Bound globals plus the uniform names each one exposes.
fn reflect_resources(module: &Module) -> Vec<(ResourceInfo, Vec<(String, UniformLocation)>)> {
    let ctx = module.to_ctx();
    let mut out = Vec::new();

    for (_, var) in module.global_variables.iter() {
        let Some(rb) = &var.binding else { continue };
        let slot = ResourceSlot {
            group: rb.group,
            binding: rb.binding,
        };
        let name = var.name.clone().unwrap_or_default();
        let inner = &module.types[var.ty].inner;
        let mut names = Vec::new();

        let kind = match (var.space, inner) {
            (AddressSpace::Uniform, _) => {
                let size = inner.size(ctx);
                names.push((
                    name.clone(),
                    UniformLocation::Block {
                        slot,
                        offset: 0,
                        size,
                    },
                ));
                if let TypeInner::Struct { members, .. } = inner {
                    for member in members {
                        let Some(member_name) = &member.name else { continue };
                        names.push((
                            member_name.clone(),
                            UniformLocation::Block {
                                slot,
                                offset: member.offset,
                                size: module.types[member.ty].inner.size(ctx),
                            },
                        ));
                    }
                }
                ResourceKind::UniformBlock { size }
            }
            (AddressSpace::Handle, TypeInner::Image { .. }) => {
                names.push((name.clone(), UniformLocation::Texture(slot)));
                ResourceKind::Texture
            }
            (AddressSpace::Handle, TypeInner::Sampler { .. }) => {
                names.push((name.clone(), UniformLocation::Sampler(slot)));
                ResourceKind::Sampler
            }
            _ => continue,
        };

        out.push((ResourceInfo { name, slot, kind }, names));
    }
    out
}

fn components(module: &Module, ty: Handle<Type>) -> u32 {
    match &module.types[ty].inner {
        TypeInner::Scalar(_) => 1,
        TypeInner::Vector { size, .. } => *size as u32,
        _ => 0,
    }
}

fn type_name(module: &Module, ty: Handle<Type>) -> String {
    match &module.types[ty].inner {
        TypeInner::Scalar(_) => "a scalar".to_owned(),
        TypeInner::Vector { size, .. } => format!("a {}-component vector", *size as u32),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = include_str!("../../../assets/shaders/vertex.wgsl");
    const FRAGMENT: &str = include_str!("../../../assets/shaders/phong.wgsl");

    fn linked() -> (NagaShaderPipeline, ProgramHandle) {
        let mut pipeline = NagaShaderPipeline::new();
        let vs = pipeline.compile(VERTEX, ShaderStage::Vertex).expect("vertex");
        let fs = pipeline.compile(FRAGMENT, ShaderStage::Fragment).expect("fragment");
        let program = pipeline.link(vs, fs).expect("link");
        (pipeline, program)
    }

    #[test]
    fn shipped_shaders_expose_the_attribute_contract() {
        let (pipeline, program) = linked();
        assert_eq!(pipeline.resolve_attribute(program, "a_position"), Some(0));
        assert_eq!(pipeline.resolve_attribute(program, "a_uv"), Some(1));
        assert_eq!(pipeline.resolve_attribute(program, "a_normal"), Some(2));
        assert_eq!(pipeline.resolve_attribute(program, "a_color"), None);

        let attrs = &pipeline.program(program).expect("program").attributes;
        let widths: Vec<_> = attrs.iter().map(|a| a.components).collect();
        assert_eq!(widths, vec![3, 2, 3]);
    }

    #[test]
    fn uniform_members_resolve_to_block_offsets() {
        let (pipeline, program) = linked();
        let slot = ResourceSlot {
            group: 0,
            binding: 0,
        };
        assert_eq!(
            pipeline.resolve_uniform(program, "u_matrix"),
            Some(UniformLocation::Block {
                slot,
                offset: 0,
                size: 64
            })
        );
        assert_eq!(
            pipeline.resolve_uniform(program, "u_model"),
            Some(UniformLocation::Block {
                slot,
                offset: 64,
                size: 64
            })
        );
        // vec3 + f32 pack into one 16-byte row.
        assert_eq!(
            pipeline.resolve_uniform(program, "u_threshold"),
            Some(UniformLocation::Block {
                slot,
                offset: 140,
                size: 4
            })
        );
        assert_eq!(
            pipeline.resolve_uniform(program, "u_cam_pos"),
            Some(UniformLocation::Block {
                slot,
                offset: 176,
                size: 12
            })
        );
        assert_eq!(
            pipeline.resolve_uniform(program, "u_texture"),
            Some(UniformLocation::Texture(ResourceSlot {
                group: 0,
                binding: 1
            }))
        );
        assert_eq!(pipeline.resolve_uniform(program, "u_fog"), None);
    }

    #[test]
    fn program_resources_merge_both_stages() {
        let (pipeline, program) = linked();
        let kinds: Vec<_> = pipeline
            .program(program)
            .expect("program")
            .resources
            .iter()
            .map(|r| (r.slot.binding, r.kind))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (0, ResourceKind::UniformBlock { size: 192 }),
                (1, ResourceKind::Texture),
                (2, ResourceKind::Sampler),
            ]
        );
    }

    #[test]
    fn syntax_error_carries_diagnostic() {
        let mut pipeline = NagaShaderPipeline::new();
        let err = pipeline
            .compile("@vertex fn vs_main( -> {", ShaderStage::Vertex)
            .unwrap_err();
        match err {
            ShaderError::Compile { stage, diagnostic } => {
                assert_eq!(stage, ShaderStage::Vertex);
                assert!(!diagnostic.is_empty());
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn missing_entry_point_for_stage_is_a_compile_error() {
        let mut pipeline = NagaShaderPipeline::new();
        let err = pipeline.compile(VERTEX, ShaderStage::Fragment).unwrap_err();
        assert!(matches!(err, ShaderError::Compile { stage: ShaderStage::Fragment, .. }));
    }

    #[test]
    fn unwritten_fragment_input_fails_to_link() {
        let fragment = r#"
            @fragment
            fn fs_main(@location(5) tint: vec3<f32>) -> @location(0) vec4<f32> {
                return vec4<f32>(tint, 1.0);
            }
        "#;
        let mut pipeline = NagaShaderPipeline::new();
        let vs = pipeline.compile(VERTEX, ShaderStage::Vertex).expect("vertex");
        let fs = pipeline.compile(fragment, ShaderStage::Fragment).expect("fragment");
        let err = pipeline.link(vs, fs).unwrap_err();
        assert!(matches!(err, ShaderError::Link { .. }));
    }

    #[test]
    fn mismatched_varying_type_fails_to_link() {
        let fragment = r#"
            @fragment
            fn fs_main(@location(0) uv: vec4<f32>) -> @location(0) vec4<f32> {
                return uv;
            }
        "#;
        let mut pipeline = NagaShaderPipeline::new();
        let vs = pipeline.compile(VERTEX, ShaderStage::Vertex).expect("vertex");
        let fs = pipeline.compile(fragment, ShaderStage::Fragment).expect("fragment");
        match pipeline.link(vs, fs).unwrap_err() {
            ShaderError::Link { diagnostic } => assert!(diagnostic.contains("location 0")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn swapped_stages_fail_to_link() {
        let mut pipeline = NagaShaderPipeline::new();
        let vs = pipeline.compile(VERTEX, ShaderStage::Vertex).expect("vertex");
        let fs = pipeline.compile(FRAGMENT, ShaderStage::Fragment).expect("fragment");
        assert!(matches!(pipeline.link(fs, vs), Err(ShaderError::Link { .. })));
    }

    #[test]
    fn unknown_program_resolves_nothing() {
        let pipeline = NagaShaderPipeline::new();
        assert_eq!(pipeline.resolve_attribute(ProgramHandle(3), "a_position"), None);
    }
}
