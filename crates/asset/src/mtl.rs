//! MTL parser producing a [`MaterialTable`].
//! Texture paths are resolved against the MTL file's directory.

use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use corelib::Vec3;

use crate::material::{
    IlluminationModel, MaterialDefinition, MaterialTable, TextureOptions, TextureSlot,
};

/// Load an MTL file; relative texture paths become absolute paths next to it.
pub fn load_mtl_from_path(path: impl AsRef<Path>) -> Result<MaterialTable> {
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open MTL file: {}", path.display()))?;
    let base_dir = std::path::absolute(path)
        .with_context(|| format!("Failed to resolve MTL path: {}", path.display()))?
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    load_mtl_from_reader(BufReader::new(file), &base_dir)
}

pub fn load_mtl_from_reader<R: BufRead>(reader: R, base_dir: &Path) -> Result<MaterialTable> {
    parse_mtl(reader, base_dir)
}

pub fn load_mtl_from_str(contents: &str, base_dir: &Path) -> Result<MaterialTable> {
    parse_mtl(io::Cursor::new(contents), base_dir)
}

fn parse_mtl<R: BufRead>(reader: R, base_dir: &Path) -> Result<MaterialTable> {
    let mut table = MaterialTable::new();
    let mut current: Option<MaterialDefinition> = None;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read line {}", line_no + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut parts = trimmed.split_whitespace();
        let Some(tag) = parts.next() else {
            continue;
        };
        let tag = tag.to_ascii_lowercase();

        if tag == "newmtl" {
            let name = trimmed["newmtl".len()..].trim();
            if name.is_empty() {
                anyhow::bail!("newmtl without a name on line {}", line_no + 1);
            }
            if let Some(done) = current.replace(MaterialDefinition::new(name)) {
                table.insert(done);
            }
            continue;
        }

        let material = current.as_mut().ok_or_else(|| {
            anyhow!("'{}' before any newmtl on line {}", tag, line_no + 1)
        })?;
        let args: Vec<&str> = parts.collect();

        match tag.as_str() {
            "ka" => material.ambient = parse_color(&args, line_no)?,
            "kd" => material.diffuse = parse_color(&args, line_no)?,
            "ks" => material.specular = parse_color(&args, line_no)?,
            "ns" => material.specular_exponent = parse_scalar(&args, line_no, "Ns")?,
            "d" => {
                // `d -halo f`: the halo flag is ignored.
                let tail = &args[args.len().saturating_sub(1)..];
                material.dissolve = parse_scalar(tail, line_no, "d")?;
            }
            "tr" => material.dissolve = 1.0 - parse_scalar(&args, line_no, "Tr")?,
            "illum" => {
                let raw = args
                    .first()
                    .ok_or_else(|| anyhow!("Missing illum value on line {}", line_no + 1))?;
                let index = raw
                    .parse::<u32>()
                    .with_context(|| format!("Invalid illum '{}' on line {}", raw, line_no + 1))?;
                match IlluminationModel::from_index(index) {
                    Some(model) => material.illumination = model,
                    None => log::warn!(
                        "Unknown illumination model {} on line {}; keeping {:?}",
                        index,
                        line_no + 1,
                        material.illumination
                    ),
                }
            }
            "map_ka" => set_map(material, TextureSlot::Ambient, &args, base_dir, line_no)?,
            "map_kd" => set_map(material, TextureSlot::Diffuse, &args, base_dir, line_no)?,
            "map_ks" => set_map(material, TextureSlot::Specular, &args, base_dir, line_no)?,
            "map_ns" => {
                set_map(material, TextureSlot::SpecularExponent, &args, base_dir, line_no)?
            }
            "map_d" => set_map(material, TextureSlot::Dissolve, &args, base_dir, line_no)?,
            "bump" | "map_bump" => set_map(material, TextureSlot::Bump, &args, base_dir, line_no)?,
            "disp" => set_map(material, TextureSlot::Displacement, &args, base_dir, line_no)?,
            "decal" => set_map(material, TextureSlot::Decal, &args, base_dir, line_no)?,
            _ => {
                // Ignore Ke/Ni/Tf/sharpness/refl etc.
            }
        }
    }

    if let Some(done) = current {
        table.insert(done);
    }
    Ok(table)
}

fn parse_scalar(args: &[&str], line_no: usize, what: &str) -> Result<f32> {
    let token = args
        .first()
        .ok_or_else(|| anyhow!("Missing {} value on line {}", what, line_no + 1))?;
    token
        .parse::<f32>()
        .with_context(|| format!("Failed to parse {} on line {}", what, line_no + 1))
}

/// `r [g b]`; a single component is replicated.
fn parse_color(args: &[&str], line_no: usize) -> Result<Vec3> {
    let values = args
        .iter()
        .take(3)
        .map(|t| t.parse::<f32>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to parse color on line {}", line_no + 1))?;
    match values.as_slice() {
        [r] => Ok(Vec3::splat(*r)),
        [r, g, b] => Ok(Vec3::new(*r, *g, *b)),
        _ => Err(anyhow!("Expected 1 or 3 color components on line {}", line_no + 1)),
    }
}

fn set_map(
    material: &mut MaterialDefinition,
    slot: TextureSlot,
    args: &[&str],
    base_dir: &Path,
    line_no: usize,
) -> Result<()> {
    let options = parse_texture_options(args, line_no)?;
    material
        .maps
        .set(slot, Some(options.resolved_against(base_dir)));
    Ok(())
}

fn parse_texture_options(args: &[&str], line_no: usize) -> Result<TextureOptions> {
    let mut options = TextureOptions::new("");
    let mut i = 0;
    while i < args.len() && args[i].starts_with('-') {
        let flag = args[i];
        i += 1;
        match flag {
            "-clamp" => options.clamp = parse_on_off(args.get(i), flag, line_no)?,
            "-blendu" => options.blend_u = parse_on_off(args.get(i), flag, line_no)?,
            "-blendv" => options.blend_v = parse_on_off(args.get(i), flag, line_no)?,
            "-bm" => {
                options.bump_multiplier = parse_scalar(&args[i..], line_no, "-bm")?;
            }
            "-o" | "-s" | "-t" => {
                let values: Vec<f32> = args[i..]
                    .iter()
                    .take(3)
                    .map_while(|t| t.parse::<f32>().ok())
                    .collect();
                if values.is_empty() {
                    anyhow::bail!("{} needs at least one value on line {}", flag, line_no + 1);
                }
                let mut v = match flag {
                    "-s" => [1.0; 3],
                    _ => [0.0; 3],
                };
                v[..values.len()].copy_from_slice(&values);
                match flag {
                    "-o" => options.offset = v,
                    "-s" => options.scale = v,
                    _ => {}
                }
                i += values.len();
                continue;
            }
            "-mm" => {
                i += 2;
                continue;
            }
            "-cc" | "-texres" | "-imfchan" | "-boost" | "-type" => {}
            other => {
                log::warn!("Ignoring unknown texture option '{}' on line {}", other, line_no + 1);
                continue;
            }
        }
        i += 1;
    }

    let file = args.get(i..).unwrap_or_default().join(" ");
    if file.is_empty() {
        anyhow::bail!("Texture map without a file name on line {}", line_no + 1);
    }
    options.path = file.into();
    Ok(options)
}

fn parse_on_off(value: Option<&&str>, flag: &str, line_no: usize) -> Result<bool> {
    match value.copied() {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        other => Err(anyhow!(
            "{} expects on/off, found {:?} on line {}",
            flag,
            other,
            line_no + 1
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const CUBE_MTL: &str = r#"
        # two materials
        newmtl red
        Ka 0.1 0.0 0.0
        Kd 0.8 0.1 0.1
        Ks 0.5
        Ns 32
        d 0.75
        illum 2
        map_Kd -clamp on -s 2 2 textures/red diffuse.png

        newmtl glass
        Tr 0.25
        illum 4
        map_Ka /abs/ambient.png
        bump -bm 0.5 bump.jpg
    "#;

    #[test]
    fn parses_colors_and_scalars() {
        let table = load_mtl_from_str(CUBE_MTL, Path::new("/assets/cube")).unwrap();
        assert_eq!(table.len(), 2);

        let red = table.get("red").unwrap();
        assert_eq!(red.ambient, Vec3::new(0.1, 0.0, 0.0));
        assert_eq!(red.specular, Vec3::splat(0.5));
        assert_eq!(red.specular_exponent, 32.0);
        assert_eq!(red.dissolve, 0.75);
        assert_eq!(red.illumination, IlluminationModel::HighlightOn);

        let glass = table.get("glass").unwrap();
        assert!((glass.dissolve - 0.75).abs() < 1e-6);
        assert_eq!(
            glass.illumination,
            IlluminationModel::TransparencyGlassOnReflectionRayTraceOn
        );
    }

    #[test]
    fn resolves_texture_paths_and_options() {
        let table = load_mtl_from_str(CUBE_MTL, Path::new("/assets/cube")).unwrap();
        let diffuse = table.get("red").unwrap().maps.get(TextureSlot::Diffuse).unwrap();
        assert_eq!(diffuse.path, PathBuf::from("/assets/cube/textures/red diffuse.png"));
        assert!(diffuse.clamp);
        assert_eq!(diffuse.scale, [2.0, 2.0, 1.0]);

        let glass = table.get("glass").unwrap();
        assert_eq!(
            glass.maps.get(TextureSlot::Ambient).unwrap().path,
            PathBuf::from("/abs/ambient.png")
        );
        let bump = glass.maps.get(TextureSlot::Bump).unwrap();
        assert_eq!(bump.bump_multiplier, 0.5);
        assert_eq!(bump.path, PathBuf::from("/assets/cube/bump.jpg"));
        assert!(glass.maps.get(TextureSlot::Diffuse).is_none());
    }

    #[test]
    fn rejects_properties_before_newmtl() {
        let err = load_mtl_from_str("Kd 1 1 1\n", Path::new("/")).unwrap_err();
        assert!(err.to_string().contains("before any newmtl"));
    }

    #[test]
    fn rejects_map_without_file() {
        let err = load_mtl_from_str("newmtl a\nmap_Kd -clamp on\n", Path::new("/")).unwrap_err();
        assert!(err.to_string().contains("without a file name"));
    }
}
