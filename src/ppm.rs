//! Decoding of ASCII PPM (.ppm) Images
//!
//! PPM (Portable PixMap) is one of the Netpbm formats. This module handles the
//! plain text "P3" variant in its strict line-oriented form:
//!
//! ```text
//! P3
//! <width> <height>
//! <maxval>
//! <r> <g> <b>
//! <r> <g> <b>
//! ...
//! ```
//!
//! Each pixel sits on its own line. Tokens are separated by one or more
//! spaces. Comments, the binary "P6" variant and multiple pixels per line are
//! not supported. The maxval is validated but samples are not rescaled.
//!
//! # Related Links
//! * <https://netpbm.sourceforge.net/doc/ppm.html> - The PPM format specification

use std::fmt;
use std::io::{self, BufRead};
use std::str::FromStr;

use image::error::{DecodingError, ImageFormatHint, LimitError, LimitErrorKind};
use image::{
    ColorType, ExtendedColorType, ImageDecoder, ImageError, ImageResult, LimitSupport, Limits,
};
use log::{debug, trace};

/// The only format tag accepted on the first line
const FILE_HEADER: &[u8] = b"P3";

/// Bytes per pixel in the decoded buffer (R, G, B)
const BPP: usize = 3;

/// Error that can occur while decoding a PPM stream.
///
/// Decoding stops at the first error; no partial image is returned.
#[derive(Debug)]
pub enum DecodeError {
    /// The first line is missing or is not exactly `P3`
    BadHeader,
    /// The dimensions line is missing or does not start with two integers
    BadDimensions,
    /// The maxval line is not an integer in `1..=255`
    BadColorDepth,
    /// A pixel line is malformed, or there are more pixels than the header
    /// declares. Carries the running byte offset into the pixel buffer at the
    /// point of failure.
    BadPixelLine(usize),
    /// The pixel buffer for the declared dimensions could not be allocated
    ImageTooLarge,
    /// The underlying reader failed
    Io(io::Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::BadHeader => f.write_str("bad header"),
            DecodeError::BadDimensions => f.write_str("bad dimensions"),
            DecodeError::BadColorDepth => f.write_str("bad colour size"),
            DecodeError::BadPixelLine(offset) => {
                f.write_fmt(format_args!("at line {offset}, bad colour size"))
            }
            DecodeError::ImageTooLarge => f.write_str("image too large to allocate"),
            DecodeError::Io(e) => f.write_fmt(format_args!("read error: {e}")),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DecodeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> DecodeError {
        DecodeError::Io(e)
    }
}

impl From<DecodeError> for ImageError {
    fn from(e: DecodeError) -> ImageError {
        match e {
            DecodeError::Io(inner) => ImageError::IoError(inner),
            DecodeError::ImageTooLarge => {
                ImageError::Limits(LimitError::from_kind(LimitErrorKind::InsufficientMemory))
            }
            _ => ImageError::Decoding(DecodingError::new(format_hint(), e)),
        }
    }
}

fn format_hint() -> ImageFormatHint {
    ImageFormatHint::Name("PPM".into())
}

/// Validated contents of the three header lines.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PpmHeader {
    pub width: u32,
    pub height: u32,
    /// Declared maximum sample value, in `1..=255`
    pub max_sample: u8,
}

impl PpmHeader {
    /// Size in bytes of the packed RGB buffer, or None if it does not fit in memory.
    fn buffer_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)?
            .checked_mul(BPP)
    }
}

/// A fully decoded image: packed RGB samples, row-major, top to bottom.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PpmImage {
    pub width: u32,
    pub height: u32,
    /// Exactly `width * height * 3` bytes
    pub pixels: Vec<u8>,
}

/// Line splitter over a BufRead which tracks the 1-based line number
struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
    line: u64,
}

impl<R: BufRead> LineReader<R> {
    fn new(inner: R) -> LineReader<R> {
        LineReader {
            inner,
            buf: Vec::new(),
            line: 0,
        }
    }

    /// Move to the next line, dropping its `\n` or `\r\n` terminator. Returns false on EOF.
    fn advance(&mut self) -> io::Result<bool> {
        self.buf.clear();
        if self.inner.read_until(b'\n', &mut self.buf)? == 0 {
            return Ok(false);
        }
        self.line += 1;

        if self.buf.last() == Some(&b'\n') {
            self.buf.pop();
        }
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        Ok(true)
    }

    /// The line read by the last successful [Self::advance]
    fn current(&self) -> &[u8] {
        &self.buf
    }

    fn next_line(&mut self) -> io::Result<Option<&[u8]>> {
        Ok(if self.advance()? {
            Some(self.current())
        } else {
            None
        })
    }
}

/// Split a line on spaces, dropping the empty tokens left by runs of spaces
fn tokens(line: &[u8]) -> impl Iterator<Item = &[u8]> {
    line.split(|&b| b == b' ').filter(|t| !t.is_empty())
}

fn parse_token<T: FromStr>(token: &[u8]) -> Option<T> {
    std::str::from_utf8(token).ok()?.parse().ok()
}

fn read_header<R: BufRead>(lines: &mut LineReader<R>) -> Result<PpmHeader, DecodeError> {
    match lines.next_line()? {
        Some(line) if line == FILE_HEADER => {}
        _ => return Err(DecodeError::BadHeader),
    }

    let (width, height) = {
        let line = lines.next_line()?.ok_or(DecodeError::BadDimensions)?;
        let mut values = tokens(line).map(parse_token::<u32>);
        match (values.next(), values.next()) {
            (Some(Some(width)), Some(Some(height))) => (width, height),
            _ => return Err(DecodeError::BadDimensions),
        }
    };

    let max_sample = lines
        .next_line()?
        .and_then(|line| parse_token::<i32>(line.trim_ascii()))
        .and_then(|v| u8::try_from(v).ok())
        .filter(|&v| v > 0)
        .ok_or(DecodeError::BadColorDepth)?;

    Ok(PpmHeader {
        width,
        height,
        max_sample,
    })
}

/// Parse one pixel line into its three samples
fn parse_pixel(line: &[u8]) -> Option<[u8; BPP]> {
    let mut values = tokens(line);
    let pixel = [
        parse_token(values.next()?)?,
        parse_token(values.next()?)?,
        parse_token(values.next()?)?,
    ];
    if values.next().is_some() {
        return None;
    }
    Some(pixel)
}

/// PPM decoder
///
/// Creating the decoder reads and validates the header; the pixel lines are
/// read when the decoder is consumed by [`PpmDecoder::decode`],
/// [`PpmDecoder::read_pixels`] or [`ImageDecoder::read_image`].
pub struct PpmDecoder<R> {
    lines: LineReader<R>,
    header: PpmHeader,
}

impl<R> PpmDecoder<R>
where
    R: BufRead,
{
    /// Create a new `PpmDecoder`, or fail on the first invalid header line.
    pub fn new(reader: R) -> Result<PpmDecoder<R>, DecodeError> {
        let mut lines = LineReader::new(reader);
        let header = read_header(&mut lines)?;
        debug!(
            "PPM header: {}x{}, maxval {}",
            header.width, header.height, header.max_sample
        );

        Ok(PpmDecoder { lines, header })
    }

    pub fn header(&self) -> PpmHeader {
        self.header
    }

    /// Read all remaining pixel lines into `buf`.
    ///
    /// `buf` must be zeroed: pixels missing from the stream are left
    /// untouched and come out black. Pixels beyond the end of `buf` are an error.
    pub fn read_pixels(mut self, buf: &mut [u8]) -> Result<(), DecodeError> {
        let mut offset = 0;
        while self.lines.advance()? {
            let line = self.lines.current();
            if line.is_empty() {
                continue;
            }
            trace!("line {}: pixel at byte offset {}", self.lines.line, offset);

            let pixel = parse_pixel(line).ok_or(DecodeError::BadPixelLine(offset))?;
            let Some(dst) = buf.get_mut(offset..offset + BPP) else {
                debug!(
                    "Pixel on line {} exceeds the {}x{} image",
                    self.lines.line, self.header.width, self.header.height
                );
                return Err(DecodeError::BadPixelLine(offset));
            };
            dst.copy_from_slice(&pixel);
            offset += BPP;
        }

        debug!("Read {} pixels", offset / BPP);
        Ok(())
    }

    /// Decode the pixel lines into a freshly allocated buffer.
    pub fn decode(self) -> Result<PpmImage, DecodeError> {
        let PpmHeader { width, height, .. } = self.header;
        let len = self.header.buffer_len().ok_or(DecodeError::BadDimensions)?;

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|_| DecodeError::ImageTooLarge)?;
        pixels.resize(len, 0);
        self.read_pixels(&mut pixels)?;

        Ok(PpmImage {
            width,
            height,
            pixels,
        })
    }
}

/// Decode a complete PPM stream.
pub fn decode<R: BufRead>(reader: R) -> Result<PpmImage, DecodeError> {
    PpmDecoder::new(reader)?.decode()
}

impl<R: BufRead> ImageDecoder for PpmDecoder<R> {
    fn dimensions(&self) -> (u32, u32) {
        (self.header.width, self.header.height)
    }

    fn color_type(&self) -> ColorType {
        ColorType::Rgb8
    }

    fn original_color_type(&self) -> ExtendedColorType {
        ExtendedColorType::Rgb8
    }

    fn set_limits(&mut self, mut limits: Limits) -> ImageResult<()> {
        limits.check_support(&LimitSupport::default())?;
        let (width, height) = self.dimensions();
        limits.check_dimensions(width, height)?;

        let Some(len) = self.header.buffer_len() else {
            return Err(ImageError::Limits(LimitError::from_kind(
                LimitErrorKind::InsufficientMemory,
            )));
        };
        limits.reserve(len as u64)?;

        Ok(())
    }

    fn read_image(self, buf: &mut [u8]) -> ImageResult<()> {
        assert_eq!(u64::try_from(buf.len()), Ok(self.total_bytes()));

        buf.fill(0);
        self.read_pixels(buf)?;
        Ok(())
    }

    fn read_image_boxed(self: Box<Self>, buf: &mut [u8]) -> ImageResult<()> {
        (*self).read_image(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decode_str(data: &str) -> Result<PpmImage, DecodeError> {
        decode(Cursor::new(data.as_bytes()))
    }

    #[test]
    fn decode_two_pixels() {
        let image = decode_str("P3\n2 1\n255\n255 0 0\n0 255 0\n").unwrap();

        assert_eq!(2, image.width);
        assert_eq!(1, image.height);
        assert_eq!(vec![255, 0, 0, 0, 255, 0], image.pixels);
    }

    #[test]
    fn decode_crlf_and_repeated_spaces() {
        let image = decode_str("P3\r\n2  2\r\n15\r\n1 2 3\r\n  4   5 6\r\n7 8 9 \r\n10 11 12").unwrap();

        assert_eq!((2, 2), (image.width, image.height));
        assert_eq!((1..=12).collect::<Vec<u8>>(), image.pixels);
    }

    #[test]
    fn decode_is_deterministic() {
        let data = "P3\n3 1\n255\n9 8 7\n6 5 4\n3 2 1\n";
        assert_eq!(decode_str(data).unwrap(), decode_str(data).unwrap());
    }

    #[test]
    fn empty_lines_are_skipped() {
        let image = decode_str("P3\n2 1\n255\n\n1 1 1\n\n2 2 2\n\n").unwrap();
        assert_eq!(vec![1, 1, 1, 2, 2, 2], image.pixels);
    }

    #[test]
    fn missing_pixels_are_black() {
        let image = decode_str("P3\n2 2\n255\n10 20 30\n").unwrap();
        assert_eq!(vec![10, 20, 30, 0, 0, 0, 0, 0, 0, 0, 0, 0], image.pixels);
    }

    #[test]
    fn bad_header() {
        for data in ["", "P6\n1 1\n255\n", "P3 \n1 1\n255\n", "p3\n", "\nP3\n"] {
            assert!(
                matches!(decode_str(data), Err(DecodeError::BadHeader)),
                "{data:?}"
            );
        }
    }

    #[test]
    fn bad_dimensions() {
        for data in ["P3\n", "P3\n2\n255\n", "P3\n2 x\n255\n", "P3\n-2 1\n255\n", "P3\n\n"] {
            assert!(
                matches!(decode_str(data), Err(DecodeError::BadDimensions)),
                "{data:?}"
            );
        }
    }

    #[test]
    fn extra_dimension_tokens_are_ignored() {
        let image = decode_str("P3\n1 1 7\n255\n1 2 3\n").unwrap();
        assert_eq!((1, 1), (image.width, image.height));
    }

    #[test]
    fn bad_color_depth() {
        for data in [
            "P3\n1 1\n",
            "P3\n1 1\n0\n",
            "P3\n1 1\n256\n",
            "P3\n1 1\n-1\n",
            "P3\n1 1\nabc\n",
            "P3\n1 1\n255 255\n",
        ] {
            assert!(
                matches!(decode_str(data), Err(DecodeError::BadColorDepth)),
                "{data:?}"
            );
        }
    }

    #[test]
    fn color_depth_is_not_applied() {
        let decoder = PpmDecoder::new(Cursor::new(b"P3\n1 1\n1\n200 100 50\n")).unwrap();
        assert_eq!(1, decoder.header().max_sample);
        assert_eq!(vec![200, 100, 50], decoder.decode().unwrap().pixels);
    }

    #[test]
    fn bad_pixel_line_reports_byte_offset() {
        let data = "P3\n3 1\n255\n1 2 3\n4 5 6\n7 8\n";
        assert!(matches!(
            decode_str(data),
            Err(DecodeError::BadPixelLine(6))
        ));

        let data = "P3\n3 1\n255\n1 2 3 4\n";
        assert!(matches!(
            decode_str(data),
            Err(DecodeError::BadPixelLine(0))
        ));

        let data = "P3\n3 1\n255\n1 2 3\n4 256 6\n";
        assert!(matches!(
            decode_str(data),
            Err(DecodeError::BadPixelLine(3))
        ));

        let data = "P3\n3 1\n255\n1 2 3\n1 -2 3\n";
        assert!(matches!(
            decode_str(data),
            Err(DecodeError::BadPixelLine(3))
        ));
    }

    #[test]
    fn too_many_pixels() {
        let data = "P3\n1 1\n255\n1 2 3\n4 5 6\n";
        assert!(matches!(
            decode_str(data),
            Err(DecodeError::BadPixelLine(3))
        ));
    }

    #[test]
    fn zero_dimensions_are_accepted() {
        let image = decode_str("P3\n0 5\n255\n").unwrap();
        assert!(image.pixels.is_empty());

        assert!(matches!(
            decode_str("P3\n0 5\n255\n1 2 3\n"),
            Err(DecodeError::BadPixelLine(0))
        ));
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn unallocatable_dimensions() {
        // 3 * 4294967295 * 1000000000 fits in usize but exceeds isize::MAX
        assert!(matches!(
            decode_str("P3\n4294967295 1000000000\n255\n1 2 3\n"),
            Err(DecodeError::ImageTooLarge)
        ));

        let err: ImageError = DecodeError::ImageTooLarge.into();
        assert!(matches!(err, ImageError::Limits(_)));
    }

    #[test]
    fn image_decoder_zeroes_buffer() {
        let decoder = PpmDecoder::new(Cursor::new(b"P3\n2 1\n255\n1 2 3\n")).unwrap();
        let mut buf = [0xAA; 6];
        decoder.read_image(&mut buf).unwrap();
        assert_eq!([1, 2, 3, 0, 0, 0], buf);
    }

    #[test]
    fn error_messages() {
        assert_eq!("bad header", DecodeError::BadHeader.to_string());
        assert_eq!("bad dimensions", DecodeError::BadDimensions.to_string());
        assert_eq!("bad colour size", DecodeError::BadColorDepth.to_string());
        assert_eq!(
            "at line 9, bad colour size",
            DecodeError::BadPixelLine(9).to_string()
        );
    }

    #[test]
    fn image_decoder() {
        let decoder = PpmDecoder::new(Cursor::new(b"P3\n1 2\n255\n1 2 3\n4 5 6\n")).unwrap();
        assert_eq!((1, 2), decoder.dimensions());
        assert_eq!(ColorType::Rgb8, decoder.color_type());

        let image = image::DynamicImage::from_decoder(decoder).unwrap();
        assert_eq!(&[1, 2, 3, 4, 5, 6], image.as_bytes());
    }

    #[test]
    fn image_decoder_limits() {
        let mut decoder = PpmDecoder::new(Cursor::new(b"P3\n20 10\n255\n")).unwrap();

        let mut limits = Limits::no_limits();
        limits.max_image_width = Some(16);
        assert!(matches!(
            decoder.set_limits(limits),
            Err(ImageError::Limits(_))
        ));

        let mut limits = Limits::no_limits();
        limits.max_alloc = Some(599);
        assert!(decoder.set_limits(limits).is_err());

        let mut limits = Limits::no_limits();
        limits.max_alloc = Some(600);
        assert!(decoder.set_limits(limits).is_ok());
    }

    #[test]
    fn decode_error_into_image_error() {
        let err: ImageError = DecodeError::BadHeader.into();
        assert!(matches!(err, ImageError::Decoding(_)));

        let err: ImageError = DecodeError::Io(io::ErrorKind::UnexpectedEof.into()).into();
        assert!(matches!(err, ImageError::IoError(_)));
    }
}
