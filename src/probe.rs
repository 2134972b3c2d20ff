//! Reading intrinsic media dimensions from disk.
//!
//! Layout only needs width and height, so nothing is decoded beyond headers.
//!
//! | Format | Crate / function |
//! |---|---|
//! | JPEG, PNG, TIFF, WebP | `image::image_dimensions` |
//! | AVIF | `avif-parse` container metadata |

use image::ImageFormat;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to read dimensions of {path}: {reason}")]
    Unreadable { path: String, reason: String },
}

/// Pixel size of a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    /// Width over height; `None` for a degenerate size.
    pub fn aspect_ratio(&self) -> Option<f64> {
        (self.width > 0 && self.height > 0).then(|| self.width as f64 / self.height as f64)
    }
}

const HEADER_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("jpg", ImageFormat::Jpeg),
    ("jpeg", ImageFormat::Jpeg),
    ("png", ImageFormat::Png),
    ("tif", ImageFormat::Tiff),
    ("tiff", ImageFormat::Tiff),
    ("webp", ImageFormat::WebP),
];

static SUPPORTED_EXTENSIONS: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    let mut exts: Vec<&'static str> = HEADER_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(ext, _)| *ext)
        .collect();
    exts.push("avif");
    exts
});

/// Extensions [`ImageProbe`] can read.
pub fn supported_extensions() -> &'static [&'static str] {
    &SUPPORTED_EXTENSIONS
}

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            supported_extensions()
                .iter()
                .any(|s| s.eq_ignore_ascii_case(e))
        })
}

/// Dimension reader. `Sync` so scans can probe from rayon workers.
pub trait MediaProbe: Sync {
    fn dimensions(&self, path: &Path) -> Result<Dimensions, ProbeError>;
}

/// Header-only probe built on the `image` and `avif-parse` crates.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageProbe;

impl ImageProbe {
    pub fn new() -> Self {
        Self
    }
}

fn is_avif(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("avif"))
}

fn unreadable(path: &Path, reason: impl std::fmt::Display) -> ProbeError {
    ProbeError::Unreadable {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

fn avif_dimensions(path: &Path) -> Result<Dimensions, ProbeError> {
    let data = std::fs::read(path)?;
    let avif = avif_parse::read_avif(&mut std::io::Cursor::new(&data))
        .map_err(|e| unreadable(path, format!("{e:?}")))?;
    let meta = avif
        .primary_item_metadata()
        .map_err(|e| unreadable(path, format!("{e:?}")))?;
    Ok(Dimensions {
        width: meta.max_frame_width.get(),
        height: meta.max_frame_height.get(),
    })
}

impl MediaProbe for ImageProbe {
    fn dimensions(&self, path: &Path) -> Result<Dimensions, ProbeError> {
        if is_avif(path) {
            return avif_dimensions(path);
        }
        let (width, height) = image::image_dimensions(path).map_err(|e| match e {
            image::ImageError::IoError(io) => ProbeError::Io(io),
            other => unreadable(path, other),
        })?;
        Ok(Dimensions { width, height })
    }
}
