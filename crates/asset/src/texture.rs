//! Texture decoding and data structures.
//! Any format enabled on `image` decodes to RGBA8; mip levels are built on the CPU.

use std::path::Path;

use corelib::TextureError;
use image::{RgbaImage, imageops::FilterType};

/// Texture data in CPU-friendly format before GPU upload.
#[derive(Clone, Debug)]
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
    /// Wrap raw RGBA8 pixels; `None` if the byte count does not match the size.
    pub fn new_rgba8(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        let expected = (width as usize) * (height as usize) * 4;
        (data.len() == expected).then_some(Self {
            data,
            width,
            height,
            format: TextureFormat::Rgba8,
        })
    }

    /// Decode an image file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, TextureError> {
        let path = path.as_ref();
        log::info!("Loading texture from {:?}", path);

        let img = image::open(path).map_err(|e| TextureError::Decode {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        Self::new_rgba8(width, height, rgba.into_raw()).ok_or_else(|| TextureError::Decode {
            path: path.to_path_buf(),
            message: "pixel data does not match image size".into(),
        })
    }

    /// Single opaque pixel, used where a material has no diffuse map.
    pub fn solid(color: [u8; 4]) -> Self {
        Self {
            data: color.to_vec(),
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8,
        }
    }

    /// Number of levels in a full mip chain down to 1x1.
    pub fn mip_level_count(&self) -> u32 {
        32 - self.width.max(self.height).max(1).leading_zeros()
    }

    /// Level 0 followed by successively halved levels, down to 1x1.
    pub fn mip_chain(&self) -> Vec<TextureData> {
        let Some(base) = RgbaImage::from_raw(self.width, self.height, self.data.clone()) else {
            return vec![self.clone()];
        };

        let mut levels = Vec::with_capacity(self.mip_level_count() as usize);
        levels.push(self.clone());
        let (mut w, mut h) = (self.width, self.height);
        while w > 1 || h > 1 {
            w = (w / 2).max(1);
            h = (h / 2).max(1);
            let level = image::imageops::resize(&base, w, h, FilterType::Triangle);
            levels.push(Self {
                data: level.into_raw(),
                width: w,
                height: h,
                format: TextureFormat::Rgba8,
            });
        }
        levels
    }

    /// Get the number of bytes per pixel for the format.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self.format {
            TextureFormat::Rgba8 => 4,
        }
    }

    /// Check if the texture data is valid.
    pub fn is_valid(&self) -> bool {
        let expected_size =
            (self.width as usize) * (self.height as usize) * self.bytes_per_pixel() as usize;
        self.data.len() == expected_size && self.width > 0 && self.height > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_halves_down_to_one_pixel() {
        let tex = TextureData::new_rgba8(8, 2, vec![200; 8 * 2 * 4]).expect("sized");
        let chain = tex.mip_chain();
        let sizes: Vec<_> = chain.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(8, 2), (4, 1), (2, 1), (1, 1)]);
        assert_eq!(chain.len() as u32, tex.mip_level_count());
        assert!(chain.iter().all(TextureData::is_valid));
    }

    #[test]
    fn mismatched_pixel_data_is_rejected() {
        assert!(TextureData::new_rgba8(2, 2, vec![0; 3]).is_none());
    }

    #[test]
    fn solid_texture_is_one_pixel() {
        let tex = TextureData::solid([255, 255, 255, 255]);
        assert!(tex.is_valid());
        assert_eq!(tex.mip_level_count(), 1);
    }

    #[test]
    fn undecodable_file_reports_decode_error() {
        let err = TextureData::load("no/such/texture.png").unwrap_err();
        assert!(matches!(err, TextureError::Decode { .. }));
    }
}
