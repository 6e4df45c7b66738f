//! MTL material library parser (`newmtl`, `Ka`, `Kd`, `Ks`, `map_Kd`).

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use corelib::ParseError;

use crate::{mesh::Material, obj::LineCtx};

/// Load every material declared in an MTL file. Diffuse maps are resolved
/// relative to the file's directory.
pub fn load_mtl_from_path(path: impl AsRef<Path>) -> Result<Vec<Material>, ParseError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    parse_mtl(BufReader::new(file), &path.display().to_string(), base_dir)
}

/// Parse MTL text held in memory; diffuse maps are kept as written.
pub fn load_mtl_from_str(contents: &str, file_name: &str) -> Result<Vec<Material>, ParseError> {
    parse_mtl(io::Cursor::new(contents), file_name, Path::new(""))
}

pub fn parse_mtl<R: BufRead>(
    reader: R,
    file_name: &str,
    base_dir: &Path,
) -> Result<Vec<Material>, ParseError> {
    let mut materials: Vec<Material> = Vec::new();

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

        if tag == "newmtl" {
            let name = parts.collect::<Vec<_>>().join(" ");
            if name.is_empty() {
                return Err(ctx.malformed("newmtl without a name"));
            }
            materials.push(Material::named(name));
            continue;
        }

        // Everything else configures the most recent block.
        let current = || ctx.malformed(format!("'{tag}' appears before any newmtl"));
        match tag {
            "Ka" => materials.last_mut().ok_or_else(current)?.ambient = ctx.floats(&mut parts, "Ka")?,
            "Kd" => materials.last_mut().ok_or_else(current)?.diffuse = ctx.floats(&mut parts, "Kd")?,
            "Ks" => materials.last_mut().ok_or_else(current)?.specular = ctx.floats(&mut parts, "Ks")?,
            "map_Kd" => {
                // Options such as `-s 1 1 1` precede the filename.
                let file = parts
                    .last()
                    .ok_or_else(|| ctx.malformed("map_Kd without a filename"))?;
                materials.last_mut().ok_or_else(current)?.diffuse_map = Some(base_dir.join(file));
            }
            _ => {
                // Ns/Ni/d/illum/Ke and the other maps do not feed this lighting model.
            }
        }
    }

    Ok(materials)
}
