//! This crate converts plain text PPM ("P3") images into other raster formats.
//!
//! The output formats are controlled via Cargo features, which are forwarded
//! to the image crate:
//! ```toml
//! [dependencies]
//! ppm2png = { version = "0.1", features = ["png", "bmp"] }
//! ```
//!
//! A whole file can be converted in one call:
//!
//!  ```rust,no_run
//! ppm2png::convert("path/to/image.ppm", "path/to/image.png", &image::Limits::no_limits())
//!     .unwrap();
//! ```
//!
//! Or the decoder can be used on its own:
//!
//!  ```rust
//! let image = ppm2png::ppm::decode(&b"P3\n2 1\n255\n255 0 0\n0 255 0\n"[..]).unwrap();
//! assert_eq!(image.pixels, [255, 0, 0, 0, 255, 0]);
//! ```

#![forbid(unsafe_code)]

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use image::{ImageDecoder, ImageError, Limits};
use log::info;

pub mod export;
pub mod ppm;

use crate::export::ExportError;
use crate::ppm::{DecodeError, PpmDecoder};

/// Errors that can occur while converting a file
#[derive(Debug)]
pub enum ConvertError {
    /// The source file could not be opened
    Open { path: PathBuf, source: io::Error },
    /// The source file is not a valid PPM image
    Decode { path: PathBuf, source: DecodeError },
    /// The source image exceeds the configured limits
    Limits { path: PathBuf, source: ImageError },
    /// The destination file could not be written
    Export { path: PathBuf, source: ExportError },
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConvertError::Open { path, .. } => {
                f.write_fmt(format_args!("Could not open file {}", path.display()))
            }
            ConvertError::Decode { path, source } => {
                f.write_fmt(format_args!("Failed to read {}, {source}", path.display()))
            }
            ConvertError::Limits { path, source } => {
                f.write_fmt(format_args!("Failed to read {}, {source}", path.display()))
            }
            ConvertError::Export { path, source } => {
                f.write_fmt(format_args!("Could not write {}, {source}", path.display()))
            }
        }
    }
}

impl std::error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConvertError::Open { source, .. } => Some(source),
            ConvertError::Decode { source, .. } => Some(source),
            ConvertError::Limits { source, .. } => Some(source),
            ConvertError::Export { source, .. } => Some(source),
        }
    }
}

/// Convert the PPM file at `source` into `dest`, returning the image dimensions.
///
/// The destination format follows from its file extension. Nothing is written
/// unless the whole source decodes successfully.
pub fn convert<P, Q>(source: P, dest: Q, limits: &Limits) -> Result<(u32, u32), ConvertError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let (source, dest) = (source.as_ref(), dest.as_ref());
    let decode_error = |e| ConvertError::Decode {
        path: source.to_path_buf(),
        source: e,
    };

    let image = {
        let file = File::open(source).map_err(|e| ConvertError::Open {
            path: source.to_path_buf(),
            source: e,
        })?;
        info!("Decoding {}", source.display());

        let mut decoder = PpmDecoder::new(BufReader::new(file)).map_err(decode_error)?;
        decoder
            .set_limits(limits.clone())
            .map_err(|e| ConvertError::Limits {
                path: source.to_path_buf(),
                source: e,
            })?;
        decoder.decode().map_err(decode_error)?
    };

    info!("Encoding {}", dest.display());
    export::save(dest, &image.pixels, image.width, image.height).map_err(|e| {
        ConvertError::Export {
            path: dest.to_path_buf(),
            source: e,
        }
    })?;

    Ok((image.width, image.height))
}
