//! CPU-side scene representation produced by the OBJ/MTL loaders.

use std::path::PathBuf;

/// One face-vertex reference resolved to concrete values (object space).
///
/// `uv` and `normal` are only meaningful when the owning [`SceneData`]
/// reports `has_uv` / `has_normal`; otherwise they stay zeroed.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct VertexRecord {
    pub position: [f32; 3],
    pub uv: [f32; 2],
    pub normal: [f32; 3],
}

impl VertexRecord {
    pub fn new(position: [f32; 3], uv: [f32; 2], normal: [f32; 3]) -> Self {
        Self {
            position,
            uv,
            normal,
        }
    }
}

/// Surface coefficients from a `newmtl` block.
#[derive(Clone, Debug, PartialEq)]
pub struct Material {
    pub name: String,
    pub ambient: [f32; 3],
    pub specular: [f32; 3],
    pub diffuse: [f32; 3],
    /// Diffuse map, already resolved against the material file's directory.
    pub diffuse_map: Option<PathBuf>,
}

impl Material {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: String::new(),
            ambient: [0.2, 0.2, 0.2],
            specular: [1.0, 1.0, 1.0],
            diffuse: [0.8, 0.8, 0.8],
            diffuse_map: None,
        }
    }
}

/// Contiguous run of vertices emitted while one `usemtl` was active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaterialGroup {
    /// Index into [`SceneData::materials`]; `None` before the first `usemtl`.
    pub material: Option<usize>,
    pub first_vertex: usize,
    pub vertex_count: usize,
}

/// Flat, non-indexed triangle list plus the materials it references.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SceneData {
    pub materials: Vec<Material>,
    pub vertices: Vec<VertexRecord>,
    pub groups: Vec<MaterialGroup>,
    pub has_uv: bool,
    pub has_normal: bool,
}

impl SceneData {
    /// The material whose coefficients light the whole draw: the last one loaded.
    pub fn lighting_material(&self) -> Option<&Material> {
        self.materials.last()
    }

    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_material_lights_the_draw() {
        let scene = SceneData {
            materials: vec![Material::named("hull"), Material::named("glass")],
            ..SceneData::default()
        };
        assert_eq!(scene.lighting_material().map(|m| m.name.as_str()), Some("glass"));
    }

    #[test]
    fn empty_scene_has_no_lighting_material() {
        assert!(SceneData::default().lighting_material().is_none());
    }
}
