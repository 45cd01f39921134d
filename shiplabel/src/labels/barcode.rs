//! Code-128 barcode rendering.

use std::io::Cursor;

use barcoders::sym::code128::Code128;
use image::{GrayImage, ImageFormat, Luma};
use thiserror::Error as ThisError;

use crate::config::BarcodeConfig;

#[derive(ThisError, Debug)]
pub enum RenderError {
    #[error("cannot encode an empty value")]
    Empty,

    #[error("character {ch:?} cannot be encoded in Code-128")]
    UnsupportedCharacter { ch: char },

    #[error("barcode encoding failed: {0}")]
    Encode(String),

    #[error("barcode rasterization failed: {0}")]
    Raster(#[from] image::ImageError),
}

/// Turns a piece of text into PNG-encoded barcode image bytes.
///
/// Rendering is CPU-bound and synchronous; callers run it on the blocking pool.
pub trait BarcodeRenderer: Send + Sync {
    fn render(&self, text: &str) -> Result<Vec<u8>, RenderError>;
}

// Character set selectors understood by barcoders
const CHARSET_A: char = 'À';
const CHARSET_B: char = 'Ɓ';

/// Code-128 symbols rasterized to 8-bit grayscale PNG.
#[derive(Debug, Clone)]
pub struct Code128Renderer {
    bar_height: u32,
    module_width: u32,
    quiet_zone: u32,
}

impl From<&BarcodeConfig> for Code128Renderer {
    fn from(config: &BarcodeConfig) -> Self {
        Self {
            bar_height: config.bar_height,
            module_width: config.module_width,
            quiet_zone: config.quiet_zone,
        }
    }
}

impl Default for Code128Renderer {
    fn default() -> Self {
        Self::from(&BarcodeConfig::default())
    }
}

impl Code128Renderer {
    /// Prefix `text` with the character set that can represent all of it.
    ///
    /// Set B covers printable ASCII, which is everything an identifier contains. Set A is the
    /// fallback for text with control characters and no lowercase.
    fn with_charset(text: &str) -> Result<String, RenderError> {
        if text.is_empty() {
            return Err(RenderError::Empty);
        }
        if text.chars().all(|c| (' '..='~').contains(&c)) {
            return Ok(format!("{CHARSET_B}{text}"));
        }
        match text.chars().find(|c| !matches!(*c as u32, 0..=95)) {
            None => Ok(format!("{CHARSET_A}{text}")),
            Some(ch) => Err(RenderError::UnsupportedCharacter { ch }),
        }
    }

    /// Encode `text` into its module sequence: 1 for a bar, 0 for a space.
    pub fn modules(&self, text: &str) -> Result<Vec<u8>, RenderError> {
        let data = Self::with_charset(text)?;
        let symbol = Code128::new(data).map_err(|e| RenderError::Encode(e.to_string()))?;
        Ok(symbol.encode())
    }

    fn rasterize(&self, modules: &[u8]) -> GrayImage {
        let total_modules = modules.len() as u32 + 2 * self.quiet_zone;
        let width = total_modules * self.module_width;
        let mut img = GrayImage::from_pixel(width, self.bar_height, Luma([255]));

        for (index, _) in modules.iter().enumerate().filter(|(_, module)| **module == 1) {
            let x0 = (self.quiet_zone + index as u32) * self.module_width;
            for x in x0..x0 + self.module_width {
                for y in 0..self.bar_height {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        img
    }
}

impl BarcodeRenderer for Code128Renderer {
    fn render(&self, text: &str) -> Result<Vec<u8>, RenderError> {
        let modules = self.modules(text)?;
        let img = self.rasterize(&modules);

        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        Ok(png)
    }
}
