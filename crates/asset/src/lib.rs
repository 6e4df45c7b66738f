//! Asset loading/parsers: OBJ meshes with MTL materials, textures,
//! and the interleaved vertex buffer fed to the GPU.

pub mod interleave;
pub mod mesh;
pub mod mtl;
pub mod obj;
pub mod texture;

pub use interleave::{InterleavedBuffer, VertexLayout};
pub use mesh::{Material, MaterialGroup, SceneData, VertexRecord};
