//! OBJ parser producing a flat, fan-triangulated list of face-vertex records.
//!
//! Every face reference becomes its own [`VertexRecord`]; nothing is
//! deduplicated, so the result feeds a single non-indexed draw.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use corelib::ParseError;

use crate::{
    mesh::{Material, MaterialGroup, SceneData, VertexRecord},
    mtl,
};

/// Supplies the materials named by `mtllib` directives.
pub trait MaterialSource {
    fn load(&mut self, library: &str) -> Result<Vec<Material>, ParseError>;
}

/// Reads material libraries from disk, relative to the mesh file's directory.
#[derive(Clone, Debug)]
pub struct DirMaterials {
    dir: PathBuf,
}

impl DirMaterials {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl MaterialSource for DirMaterials {
    fn load(&mut self, library: &str) -> Result<Vec<Material>, ParseError> {
        mtl::load_mtl_from_path(self.dir.join(library))
    }
}

/// In-memory material libraries keyed by file name.
impl MaterialSource for HashMap<String, String> {
    fn load(&mut self, library: &str) -> Result<Vec<Material>, ParseError> {
        match self.get(library) {
            Some(contents) => mtl::load_mtl_from_str(contents, library),
            None => Err(ParseError::Io {
                path: PathBuf::from(library),
                source: io::Error::new(io::ErrorKind::NotFound, "no such material library"),
            }),
        }
    }
}

/// Load an OBJ scene from a file path, pulling in its material libraries.
pub fn load_obj_from_path(path: impl AsRef<Path>) -> Result<SceneData, ParseError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let scene = parse_obj(
        BufReader::new(file),
        &path.display().to_string(),
        &mut DirMaterials::new(dir),
    )?;

    log::info!(
        "Loaded {}: {} vertices ({} triangles), uv={}, normal={}, {} material(s), {} group(s)",
        path.display(),
        scene.vertices.len(),
        scene.triangle_count(),
        scene.has_uv,
        scene.has_normal,
        scene.materials.len(),
        scene.groups.len()
    );
    Ok(scene)
}

/// Parse OBJ text held in memory.
pub fn load_obj_from_str(
    contents: &str,
    materials: &mut impl MaterialSource,
) -> Result<SceneData, ParseError> {
    parse_obj(io::Cursor::new(contents), "<memory>", materials)
}

/// Location context for error reporting, shared with the MTL parser.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LineCtx<'a> {
    pub file: &'a str,
    pub line: usize,
}

impl LineCtx<'_> {
    pub(crate) fn malformed(&self, message: impl Into<String>) -> ParseError {
        ParseError::Malformed {
            file: self.file.to_owned(),
            line: self.line,
            message: message.into(),
        }
    }

    pub(crate) fn floats<'t, const N: usize>(
        &self,
        parts: &mut impl Iterator<Item = &'t str>,
        what: &str,
    ) -> Result<[f32; N], ParseError> {
        let mut out = [0.0; N];
        for (i, slot) in out.iter_mut().enumerate() {
            let token = parts.next().ok_or_else(|| {
                self.malformed(format!("{what} needs {N} components, found {i}"))
            })?;
            *slot = token
                .parse::<f32>()
                .map_err(|_| self.malformed(format!("invalid {what} component '{token}'")))?;
        }
        Ok(out)
    }

    fn inconsistent(&self, message: impl Into<String>) -> ParseError {
        ParseError::Inconsistent {
            file: self.file.to_owned(),
            line: self.line,
            message: message.into(),
        }
    }
}

/// A face-vertex before the mesh-wide presence flags are known.
#[derive(Clone, Copy)]
struct PendingVertex {
    position: [f32; 3],
    uv: Option<[f32; 2]>,
    normal: Option<[f32; 3]>,
    line: usize,
}

pub fn parse_obj<R: BufRead>(
    reader: R,
    file_name: &str,
    source: &mut impl MaterialSource,
) -> Result<SceneData, ParseError> {
    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut texcoords: Vec<[f32; 2]> = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();

    let mut pending: Vec<PendingVertex> = Vec::new();
    let mut materials: Vec<Material> = Vec::new();
    let mut groups: Vec<MaterialGroup> = Vec::new();
    let mut current_material: Option<usize> = None;

    for (line_no, line) in reader.lines().enumerate() {
        let ctx = LineCtx {
            file: file_name,
            line: line_no + 1,
        };
        let line = line.map_err(|e| ctx.malformed(format!("unreadable line: {e}")))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else { continue };

        match tag {
            // Optional trailing w / third texture coordinate are ignored.
            "v" => positions.push(ctx.floats(&mut parts, "position")?),
            "vt" => texcoords.push(ctx.floats(&mut parts, "texture coordinate")?),
            "vn" => normals.push(ctx.floats(&mut parts, "normal")?),
            "mtllib" => {
                let mut any = false;
                for library in parts {
                    materials.extend(source.load(library)?);
                    any = true;
                }
                if !any {
                    return Err(ctx.malformed("mtllib without a file name"));
                }
            }
            "usemtl" => {
                let name = parts.collect::<Vec<_>>().join(" ");
                let index = materials.iter().rposition(|m| m.name == name).ok_or_else(|| {
                    ParseError::UnknownMaterial {
                        file: file_name.to_owned(),
                        line: ctx.line,
                        name,
                    }
                })?;
                current_material = Some(index);
            }
            "f" => {
                let mut corners: Vec<PendingVertex> = Vec::new();
                for token in parts {
                    corners.push(resolve_face_vertex(
                        token, &positions, &texcoords, &normals, ctx,
                    )?);
                }
                if corners.len() < 3 {
                    return Err(ctx.malformed(format!(
                        "face needs at least 3 vertices, found {}",
                        corners.len()
                    )));
                }

                let first_new = pending.len();
                // Triangulate fan
                for tri in 1..(corners.len() - 1) {
                    pending.extend([corners[0], corners[tri], corners[tri + 1]]);
                }
                extend_group(&mut groups, current_material, first_new, pending.len());
            }
            _ => {
                // Ignore other directives (o/g/s/l/etc.)
            }
        }
    }

    let has_uv = !texcoords.is_empty();
    let has_normal = !normals.is_empty();

    let mut vertices = Vec::with_capacity(pending.len());
    for p in pending {
        let ctx = LineCtx {
            file: file_name,
            line: p.line,
        };
        // An index into an empty pool already failed in `resolve_index`, so
        // only a missing index can disagree with the pools here.
        let uv = match p.uv {
            Some(uv) => uv,
            None if !has_uv => [0.0, 0.0],
            None => {
                return Err(ctx.inconsistent("face vertex lacks a UV index but the mesh declares UVs"));
            }
        };
        let normal = match p.normal {
            Some(n) => n,
            None if !has_normal => [0.0, 0.0, 0.0],
            None => {
                return Err(ctx.inconsistent(
                    "face vertex lacks a normal index but the mesh declares normals",
                ));
            }
        };
        vertices.push(VertexRecord::new(p.position, uv, normal));
    }

    Ok(SceneData {
        materials,
        vertices,
        groups,
        has_uv,
        has_normal,
    })
}

fn extend_group(
    groups: &mut Vec<MaterialGroup>,
    material: Option<usize>,
    start: usize,
    end: usize,
) {
    match groups.last_mut() {
        Some(last) if last.material == material => last.vertex_count += end - start,
        _ => groups.push(MaterialGroup {
            material,
            first_vertex: start,
            vertex_count: end - start,
        }),
    }
}

/// Resolve `p`, `p/t`, `p//n` or `p/t/n` into concrete values.
fn resolve_face_vertex(
    token: &str,
    positions: &[[f32; 3]],
    texcoords: &[[f32; 2]],
    normals: &[[f32; 3]],
    ctx: LineCtx<'_>,
) -> Result<PendingVertex, ParseError> {
    let mut split = token.split('/');
    let pos = split
        .next()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ctx.malformed(format!("malformed face element '{token}'")))?;
    let position = positions[resolve_index(pos, positions.len(), "position", ctx)?];

    let uv = match split.next() {
        Some(value) if !value.is_empty() => {
            Some(texcoords[resolve_index(value, texcoords.len(), "texture coordinate", ctx)?])
        }
        _ => None,
    };

    let normal = match split.next() {
        Some(value) if !value.is_empty() => {
            Some(normals[resolve_index(value, normals.len(), "normal", ctx)?])
        }
        _ => None,
    };

    if split.next().is_some() {
        return Err(ctx.malformed(format!("face element '{token}' has too many segments")));
    }

    Ok(PendingVertex {
        position,
        uv,
        normal,
        line: ctx.line,
    })
}

/// 1-based index; negative values count back from the end of the pool.
fn resolve_index(
    token: &str,
    len: usize,
    kind: &'static str,
    ctx: LineCtx<'_>,
) -> Result<usize, ParseError> {
    let raw = token
        .parse::<i64>()
        .map_err(|_| ctx.malformed(format!("invalid {kind} index '{token}'")))?;
    if raw == 0 {
        return Err(ctx.malformed("OBJ indices are 1-based; found 0"));
    }

    let idx = if raw > 0 { raw - 1 } else { len as i64 + raw };
    if idx < 0 || idx as usize >= len {
        return Err(ParseError::IndexOutOfRange {
            file: ctx.file.to_owned(),
            line: ctx.line,
            kind,
            index: raw,
            len,
        });
    }

    Ok(idx as usize)
}
