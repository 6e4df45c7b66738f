//! Startup sequence: parse, compile, link, resolve, load textures, upload.
//! Every step runs even when an earlier one failed so a single run reports
//! all problems at once.

use std::path::{Path, PathBuf};

use asset::{InterleavedBuffer, SceneData, obj};
use corelib::{ParseError, SetupFailure, ShaderStage, StartupError, Vec3, transform::Bounds};

use crate::{
    backend::{FrameBackend, TextureHandle, TextureLoader},
    frame::{AttributeBindings, Lighting, RenderContext, UniformBindings},
    shader::{ProgramHandle, ShaderHandle, ShaderPipeline},
};

pub const DEFAULT_MODEL: &str = "assets/cube.obj";
pub const DEFAULT_VERTEX_SHADER: &str = "assets/shaders/vertex.wgsl";
pub const DEFAULT_FRAGMENT_SHADER: &str = "assets/shaders/phong.wgsl";

const CLEAR_COLOR: [f32; 4] = [0.05, 0.05, 0.08, 1.0];

/// Input files, relative to the working directory unless absolute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScenePaths {
    pub model: PathBuf,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl Default for ScenePaths {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.into(),
            vertex_shader: DEFAULT_VERTEX_SHADER.into(),
            fragment_shader: DEFAULT_FRAGMENT_SHADER.into(),
        }
    }
}

/// Raw startup inputs; each one may independently have failed to load.
#[derive(Debug)]
pub struct SceneSources {
    pub vertex_shader: Result<String, SetupFailure>,
    pub fragment_shader: Result<String, SetupFailure>,
    pub scene: Result<SceneData, ParseError>,
}

impl SceneSources {
    pub fn read(paths: &ScenePaths) -> Self {
        Self {
            vertex_shader: read_source(&paths.vertex_shader),
            fragment_shader: read_source(&paths.fragment_shader),
            scene: obj::load_obj_from_path(&paths.model),
        }
    }
}

fn read_source(path: &Path) -> Result<String, SetupFailure> {
    std::fs::read_to_string(path).map_err(|source| SetupFailure::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Read the files and build the render context.
pub fn prepare_scene<B>(backend: &mut B, paths: &ScenePaths) -> Result<RenderContext, StartupError>
where
    B: ShaderPipeline + TextureLoader + FrameBackend + ?Sized,
{
    assemble_scene(backend, SceneSources::read(paths))
}

pub fn assemble_scene<B>(backend: &mut B, sources: SceneSources) -> Result<RenderContext, StartupError>
where
    B: ShaderPipeline + TextureLoader + FrameBackend + ?Sized,
{
    let mut failures = Vec::new();

    let vertex = compile(backend, sources.vertex_shader, ShaderStage::Vertex, &mut failures);
    let fragment = compile(backend, sources.fragment_shader, ShaderStage::Fragment, &mut failures);

    let mut bindings = None;
    if let (Some(vs), Some(fs)) = (vertex, fragment) {
        match link_and_resolve(backend, vs, fs) {
            Ok(resolved) => bindings = Some(resolved),
            Err(failure) => failures.push(failure),
        }
    }

    let scene = match sources.scene {
        Ok(scene) => Some(scene),
        Err(e) => {
            failures.push(e.into());
            None
        }
    };

    // One load per material that names a map, in material order.
    let mut textures: Vec<Option<TextureHandle>> = Vec::new();
    if let Some(scene) = &scene {
        for material in &scene.materials {
            let handle = match &material.diffuse_map {
                Some(path) => match backend.load(path) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        failures.push(e.into());
                        None
                    }
                },
                None => None,
            };
            textures.push(handle);
        }
    }

    let mut vertex_count = 0;
    if let Some(scene) = &scene {
        match draw_count(scene.vertices.len()) {
            Ok(count) => vertex_count = count,
            Err(failure) => failures.push(failure),
        }
    }

    if !failures.is_empty() {
        for failure in &failures {
            log::error!("{failure}");
        }
        return Err(StartupError { failures });
    }

    let (Some((program, attributes, uniforms)), Some(scene)) = (bindings, scene) else {
        // Both are present whenever no failure was recorded.
        return Err(StartupError { failures });
    };

    let lighting = match scene.lighting_material() {
        Some(material) => {
            log::info!("Lighting with material '{}'", material.name);
            Lighting::from(material)
        }
        None => {
            log::warn!("Scene declares no materials; using default lighting");
            Lighting::default()
        }
    };
    let texture = textures.last().copied().flatten();
    let bounds = Bounds::from_points(scene.vertices.iter().map(|v| Vec3::from(v.position)));

    let buffer = InterleavedBuffer::build(&scene.vertices, scene.has_uv, scene.has_normal);
    if buffer.is_empty() {
        log::warn!("Scene has no faces; frames will only clear");
    }
    let layout = buffer.layout();
    let vertex_buffer = backend.upload_vertices(buffer.into_vec());
    log::info!(
        "Uploaded {vertex_count} vertices (stride {} floats)",
        layout.stride()
    );

    Ok(RenderContext {
        program,
        attributes,
        uniforms,
        layout,
        vertex_buffer,
        vertex_count,
        bounds,
        lighting,
        texture,
        clear_color: CLEAR_COLOR,
    })
}

/// Draw calls take a `u32` vertex count.
fn draw_count(vertices: usize) -> Result<u32, SetupFailure> {
    u32::try_from(vertices).map_err(|_| SetupFailure::MeshTooLarge { vertices })
}

fn compile<B: ShaderPipeline + ?Sized>(
    backend: &mut B,
    source: Result<String, SetupFailure>,
    stage: ShaderStage,
    failures: &mut Vec<SetupFailure>,
) -> Option<ShaderHandle> {
    let result = source.and_then(|src| backend.compile(&src, stage).map_err(SetupFailure::from));
    match result {
        Ok(handle) => Some(handle),
        Err(failure) => {
            failures.push(failure);
            None
        }
    }
}

fn link_and_resolve<B: ShaderPipeline + ?Sized>(
    backend: &mut B,
    vertex: ShaderHandle,
    fragment: ShaderHandle,
) -> Result<(ProgramHandle, AttributeBindings, UniformBindings), SetupFailure> {
    let program = backend.link(vertex, fragment)?;
    let attributes = AttributeBindings::resolve(&*backend, program)?;
    let uniforms = UniformBindings::resolve(&*backend, program);
    Ok((program, attributes, uniforms))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::mock::RecordingGpu;
    use corelib::{ShaderError, TextureError};

    const TEXTURED: &str = "\
mtllib box.mtl
v 0 0 0
v 1 0 0
v 1 1 0
vt 0 0
vt 1 0
vt 1 1
vn 0 0 1
usemtl crate
f 1/1/1 2/2/1 3/3/1
";

    fn scene(mesh: &str, mtl: &str) -> Result<SceneData, ParseError> {
        let mut libs = HashMap::from([("box.mtl".to_owned(), mtl.to_owned())]);
        obj::load_obj_from_str(mesh, &mut libs)
    }

    fn sources(mesh: &str, mtl: &str) -> SceneSources {
        SceneSources {
            vertex_shader: Ok("vertex".into()),
            fragment_shader: Ok("fragment".into()),
            scene: scene(mesh, mtl),
        }
    }

    #[test]
    fn successful_startup_uploads_interleaved_vertices() {
        let mut gpu = RecordingGpu::new();
        let mtl = "newmtl crate\nKa 0.1 0.1 0.1\nKs 0.5 0.5 0.5\nKd 0.8 0.8 0.8\nmap_Kd wood.png\n";
        let ctx = assemble_scene(&mut gpu, sources(TEXTURED, mtl)).expect("startup");

        assert_eq!(ctx.vertex_count, 3);
        assert_eq!(ctx.layout.stride(), 8);
        assert_eq!(gpu.uploads.len(), 1);
        assert_eq!(gpu.uploads[0].len(), 24);
        assert_eq!(gpu.loaded, vec![PathBuf::from("wood.png")]);
        assert_eq!(ctx.texture, Some(TextureHandle(0)));
        assert_eq!(ctx.lighting.ambient, [0.1; 3]);
        assert_eq!(ctx.attributes.uv, Some(1));
    }

    #[test]
    fn material_without_map_never_loads_a_texture() {
        let mut gpu = RecordingGpu::new();
        let mtl = "newmtl crate\nKa 0.1 0.1 0.1\nKs 0.5 0.5 0.5\nKd 0.8 0.8 0.8\n";
        let ctx = assemble_scene(&mut gpu, sources(TEXTURED, mtl)).expect("startup");

        assert!(gpu.loaded.is_empty());
        assert_eq!(ctx.texture, None);
        assert_eq!(ctx.lighting.specular, [0.5; 3]);
        assert_eq!(ctx.lighting.diffuse, [0.8; 3]);
    }

    #[test]
    fn last_material_supplies_lighting_and_texture() {
        let mesh = "mtllib box.mtl\nv 0 0 0\nv 1 0 0\nv 1 1 0\nusemtl a\nf 1 2 3\nusemtl b\nf 3 2 1\n";
        let mtl = "newmtl a\nKa 0.3 0.3 0.3\nmap_Kd a.png\nnewmtl b\nKa 0.7 0.7 0.7\n";
        let mut gpu = RecordingGpu::new();
        let ctx = assemble_scene(&mut gpu, sources(mesh, mtl)).expect("startup");

        assert_eq!(ctx.lighting.ambient, [0.7; 3]);
        assert_eq!(gpu.loaded.len(), 1);
        assert_eq!(ctx.texture, None);
        assert_eq!(ctx.vertex_count, 6);
    }

    #[test]
    fn scene_without_materials_uses_default_lighting() {
        let mut gpu = RecordingGpu::new();
        let mesh = "v 0 0 0\nv 1 0 0\nv 1 1 0\nf 1 2 3\n";
        let ctx = assemble_scene(&mut gpu, sources(mesh, "")).expect("startup");
        assert_eq!(ctx.lighting, Lighting::default());
        assert_eq!(ctx.layout.stride(), 3);
    }

    #[test]
    fn every_failing_step_is_reported_together() {
        let mut gpu = RecordingGpu::new();
        gpu.reject_marker = Some("broken");
        let mtl = "newmtl crate\nmap_Kd broken.png\n";
        let mut inputs = sources(TEXTURED, mtl);
        inputs.vertex_shader = Ok("broken vertex".into());
        inputs.fragment_shader = Err(SetupFailure::Io {
            path: "missing.wgsl".into(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        });

        let err = assemble_scene(&mut gpu, inputs).unwrap_err();
        assert_eq!(err.failures.len(), 3);
        assert!(matches!(
            err.failures[0],
            SetupFailure::Shader(ShaderError::Compile { stage: ShaderStage::Vertex, .. })
        ));
        assert!(matches!(err.failures[1], SetupFailure::Io { .. }));
        assert!(matches!(err.failures[2], SetupFailure::Texture(TextureError::Decode { .. })));
        assert!(gpu.uploads.is_empty());
    }

    #[test]
    fn parse_and_link_failures_accumulate() {
        let mut gpu = RecordingGpu::new();
        gpu.fail_link = true;
        let mut inputs = sources(TEXTURED, "");
        inputs.scene = scene("v 0 0 0\nf 1 2 3\n", "");

        let err = assemble_scene(&mut gpu, inputs).unwrap_err();
        assert_eq!(err.failures.len(), 2);
        assert!(matches!(err.failures[0], SetupFailure::Shader(ShaderError::Link { .. })));
        assert!(matches!(
            err.failures[1],
            SetupFailure::Parse(ParseError::IndexOutOfRange { .. })
        ));
    }

    #[test]
    fn missing_position_attribute_fails_startup() {
        let mut gpu = RecordingGpu::new();
        gpu.attributes.remove("a_position");
        let err = assemble_scene(&mut gpu, sources(TEXTURED, "newmtl crate\n")).unwrap_err();
        assert!(matches!(
            err.failures.as_slice(),
            [SetupFailure::Shader(ShaderError::BindingNotFound { .. })]
        ));
    }

    #[test]
    fn missing_optional_uniform_is_not_fatal() {
        let mut gpu = RecordingGpu::new();
        gpu.uniforms.remove("u_threshold");
        let ctx = assemble_scene(&mut gpu, sources(TEXTURED, "newmtl crate\n")).expect("startup");
        assert_eq!(ctx.uniforms.threshold, None);
        assert!(ctx.uniforms.matrix.is_some());
    }

    #[test]
    fn empty_mesh_is_not_an_error() {
        let mut gpu = RecordingGpu::new();
        let ctx = assemble_scene(&mut gpu, sources("", "")).expect("startup");
        assert_eq!(ctx.vertex_count, 0);
        assert_eq!(ctx.bounds, None);
        assert!(gpu.uploads[0].is_empty());
    }

    #[test]
    fn vertex_count_beyond_u32_is_a_startup_failure() {
        assert_eq!(draw_count(36).ok(), Some(36));
        assert_eq!(draw_count(u32::MAX as usize).ok(), Some(u32::MAX));
        #[cfg(target_pointer_width = "64")]
        assert!(matches!(
            draw_count(u32::MAX as usize + 1),
            Err(SetupFailure::MeshTooLarge { vertices }) if vertices == 1 << 32
        ));
    }

    #[test]
    fn shipped_cube_prepares_from_disk() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let paths = ScenePaths {
            model: root.join(DEFAULT_MODEL),
            vertex_shader: root.join(DEFAULT_VERTEX_SHADER),
            fragment_shader: root.join(DEFAULT_FRAGMENT_SHADER),
        };
        let mut gpu = RecordingGpu::new();
        let ctx = prepare_scene(&mut gpu, &paths).expect("startup");

        assert_eq!(ctx.vertex_count, 36);
        assert_eq!(ctx.layout.stride(), 8);
        let bounds = ctx.bounds.expect("cube has faces");
        assert_eq!(bounds.min, Vec3::splat(-1.0));
        assert_eq!(bounds.max, Vec3::ONE);
        assert_eq!(gpu.loaded.len(), 1);
        assert!(gpu.loaded[0].ends_with("checker.png"));
    }

    #[test]
    fn unreadable_files_are_collected() {
        let paths = ScenePaths {
            model: "no/such/model.obj".into(),
            vertex_shader: "no/such/vertex.wgsl".into(),
            fragment_shader: "no/such/phong.wgsl".into(),
        };
        let mut gpu = RecordingGpu::new();
        let err = prepare_scene(&mut gpu, &paths).unwrap_err();
        assert_eq!(err.failures.len(), 3);
        assert!(matches!(err.failures[2], SetupFailure::Parse(ParseError::Io { .. })));
    }
}
