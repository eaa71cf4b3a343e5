//! Texture decoding into RGBA8 with a CPU-generated mip chain.

use std::path::Path;

use anyhow::{Context, Result, ensure};
use image::{RgbaImage, imageops::FilterType};

/// Texture data in CPU-friendly format before GPU upload.
#[derive(Clone, Debug, PartialEq)]
pub struct TextureData {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Supported texture formats.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TextureFormat {
    Rgba8,
}

impl TextureData {
    /// Create a new texture with given dimensions and RGBA8 format.
    pub fn new_rgba8(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        ensure!(width > 0 && height > 0, "Texture must not be empty ({width}x{height})");
        ensure!(
            data.len() == (width as usize) * (height as usize) * 4,
            "Data size {} doesn't match RGBA8 {}x{}",
            data.len(),
            width,
            height
        );
        Ok(Self {
            data,
            width,
            height,
            format: TextureFormat::Rgba8,
        })
    }

    /// Decode any supported image file (PNG, JPEG) into RGBA8.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        log::info!("Loading texture from {:?}", path);

        let img = image::open(path).with_context(|| format!("Failed to open image {:?}", path))?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let data = rgba.into_raw();

        log::info!("Loaded texture {}x{} with {} bytes", width, height, data.len());

        Self::new_rgba8(width, height, data)
    }

    /// 1x1 texture of a single color.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            data: rgba.to_vec(),
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8,
        }
    }

    /// Create a simple test texture (checkerboard pattern).
    pub fn create_test_texture(size: u32) -> Self {
        let size = size.max(1);
        let mut data = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let checker = ((x / 8) + (y / 8)) % 2;
                if checker == 0 {
                    data.extend_from_slice(&[255, 255, 255, 255]);
                } else {
                    data.extend_from_slice(&[128, 128, 128, 255]);
                }
            }
        }

        Self {
            data,
            width: size,
            height: size,
            format: TextureFormat::Rgba8,
        }
    }

    /// Get the number of bytes per pixel for the format.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self.format {
            TextureFormat::Rgba8 => 4,
        }
    }

    /// Check if the texture data is valid.
    pub fn is_valid(&self) -> bool {
        let expected_size = (self.width * self.height * self.bytes_per_pixel()) as usize;
        self.data.len() == expected_size && self.width > 0 && self.height > 0
    }

    /// Levels in a full mip chain down to 1x1.
    pub fn mip_level_count(&self) -> u32 {
        32 - self.width.max(self.height).max(1).leading_zeros()
    }

    /// Full mip chain, level 0 first. Each level halves both sides
    /// (never below 1) using a triangle filter.
    pub fn mip_chain(&self) -> Result<Vec<TextureData>> {
        let base = RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .context("Texture data does not match its dimensions")?;
        let mut levels = vec![self.clone()];
        let (mut w, mut h) = (self.width, self.height);
        for _ in 1..self.mip_level_count() {
            w = (w / 2).max(1);
            h = (h / 2).max(1);
            let level = image::imageops::resize(&base, w, h, FilterType::Triangle);
            levels.push(Self::new_rgba8(w, h, level.into_raw())?);
        }
        Ok(levels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_halves_down_to_one() {
        let tex = TextureData::create_test_texture(16);
        assert_eq!(tex.mip_level_count(), 5);
        let chain = tex.mip_chain().unwrap();
        let sizes: Vec<_> = chain.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(16, 16), (8, 8), (4, 4), (2, 2), (1, 1)]);
        assert!(chain.iter().all(TextureData::is_valid));
    }

    #[test]
    fn non_square_chain_clamps_short_side() {
        let tex = TextureData::new_rgba8(4, 1, vec![255; 16]).unwrap();
        let sizes: Vec<_> = tex
            .mip_chain()
            .unwrap()
            .iter()
            .map(|l| (l.width, l.height))
            .collect();
        assert_eq!(sizes, vec![(4, 1), (2, 1), (1, 1)]);
    }

    #[test]
    fn rejects_wrong_data_size() {
        assert!(TextureData::new_rgba8(2, 2, vec![0; 15]).is_err());
        assert!(TextureData::new_rgba8(0, 2, vec![]).is_err());
    }

    #[test]
    fn load_round_trips_png() {
        let dir = std::env::temp_dir().join(format!("asset-texture-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("checker.png");
        let tex = TextureData::create_test_texture(8);
        image::save_buffer(&path, &tex.data, 8, 8, image::ExtendedColorType::Rgba8).unwrap();

        let loaded = TextureData::load(&path).unwrap();
        assert_eq!(loaded, tex);
        assert!(TextureData::load(dir.join("missing.png")).is_err());
        std::fs::remove_dir_all(&dir).ok();
    }
}
