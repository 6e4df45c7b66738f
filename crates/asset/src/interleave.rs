//! Packs face-vertex records into one interleaved float buffer.
//!
//! Per-vertex layout is always `[position(3), uv(2)?, normal(3)?]`; the
//! optional fields are present for every vertex or for none.

use crate::mesh::VertexRecord;

/// Which optional attributes the buffer carries, and where they sit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct VertexLayout {
    pub has_uv: bool,
    pub has_normal: bool,
}

impl VertexLayout {
    pub const POSITION_COMPONENTS: usize = 3;
    pub const UV_COMPONENTS: usize = 2;
    pub const NORMAL_COMPONENTS: usize = 3;

    pub const fn new(has_uv: bool, has_normal: bool) -> Self {
        Self { has_uv, has_normal }
    }

    /// Floats per vertex.
    pub const fn stride(&self) -> usize {
        Self::POSITION_COMPONENTS
            + Self::UV_COMPONENTS * self.has_uv as usize
            + Self::NORMAL_COMPONENTS * self.has_normal as usize
    }

    #[inline]
    pub const fn stride_bytes(&self) -> usize {
        self.stride() * std::mem::size_of::<f32>()
    }

    /// Float offset of the UV pair, if present.
    pub const fn uv_offset(&self) -> Option<usize> {
        if self.has_uv {
            Some(Self::POSITION_COMPONENTS)
        } else {
            None
        }
    }

    /// Float offset of the normal, if present.
    pub const fn normal_offset(&self) -> Option<usize> {
        if !self.has_normal {
            return None;
        }
        if self.has_uv {
            Some(Self::POSITION_COMPONENTS + Self::UV_COMPONENTS)
        } else {
            Some(Self::POSITION_COMPONENTS)
        }
    }
}

/// Owned interleaved vertex data, `layout.stride() * vertex_count` floats long.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InterleavedBuffer {
    data: Vec<f32>,
    layout: VertexLayout,
}

impl InterleavedBuffer {
    pub fn build(vertices: &[VertexRecord], has_uv: bool, has_normal: bool) -> Self {
        let layout = VertexLayout::new(has_uv, has_normal);
        let mut data = Vec::with_capacity(layout.stride() * vertices.len());

        for v in vertices {
            data.extend_from_slice(&v.position);
            if has_uv {
                data.extend_from_slice(&v.uv);
            }
            if has_normal {
                data.extend_from_slice(&v.normal);
            }
        }

        debug_assert_eq!(data.len(), layout.stride() * vertices.len());
        Self { data, layout }
    }

    #[inline]
    pub fn layout(&self) -> VertexLayout {
        self.layout
    }

    #[inline]
    pub fn stride(&self) -> usize {
        self.layout.stride()
    }

    #[inline]
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn vertex_count(&self) -> usize {
        self.data.len() / self.stride()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Hand the floats over for upload; the host copy is not needed afterwards.
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }
}
