//! Saving of packed RGB buffers
//!
//! The output format is picked by the `image` crate from the file extension of
//! the destination. Only the formats enabled through this crate's Cargo
//! features (`png` by default) can be written.

use std::fmt;
use std::path::Path;

use image::{ExtendedColorType, ImageError};
use log::debug;

/// Errors that can occur when saving an image
#[derive(Debug)]
pub enum ExportError {
    /// The buffer length is not `width * height * 3`
    BufferSize { expected: u64, actual: usize },
    /// The encoder failed, or the destination format is not supported
    Image(ImageError),
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::BufferSize { expected, actual } => f.write_fmt(format_args!(
                "buffer holds {actual} bytes but the image needs {expected}"
            )),
            ExportError::Image(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Image(e) => Some(e),
            ExportError::BufferSize { .. } => None,
        }
    }
}

impl From<ImageError> for ExportError {
    fn from(e: ImageError) -> ExportError {
        ExportError::Image(e)
    }
}

/// Save an RGB8 buffer of `width` x `height` pixels to `path`.
pub fn save<P: AsRef<Path>>(
    path: P,
    buffer: &[u8],
    width: u32,
    height: u32,
) -> Result<(), ExportError> {
    let expected = u64::from(width) * u64::from(height) * 3;
    if u64::try_from(buffer.len()) != Ok(expected) {
        return Err(ExportError::BufferSize {
            expected,
            actual: buffer.len(),
        });
    }

    debug!("Saving {}x{} image to {}", width, height, path.as_ref().display());
    image::save_buffer(path, buffer, width, height, ExtendedColorType::Rgb8)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("ppm2png-export-{}-{name}", std::process::id()))
    }

    #[test]
    fn buffer_size_mismatch() {
        let path = temp_path("mismatch.png");
        let err = save(&path, &[0; 5], 1, 2).unwrap_err();

        assert!(matches!(
            err,
            ExportError::BufferSize {
                expected: 6,
                actual: 5
            }
        ));
        assert!(!path.exists());
    }

    #[test]
    fn unsupported_extension() {
        let path = temp_path("image.unknown-format");
        let err = save(&path, &[0; 3], 1, 1).unwrap_err();

        assert!(matches!(err, ExportError::Image(_)));
    }

    #[cfg(feature = "png")]
    #[test]
    fn save_png() {
        let path = temp_path("two-pixels.png");
        save(&path, &[255, 0, 0, 0, 255, 0], 2, 1).unwrap();

        let img = image::open(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(image::ColorType::Rgb8, img.color());
        assert_eq!((2, 1), (img.width(), img.height()));
        assert_eq!(&[255, 0, 0, 0, 255, 0], img.as_bytes());
    }
}
