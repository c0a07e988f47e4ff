//! Validation of base64 photo payloads.
//!
//! Phones send photos as base64, sometimes wrapped in a `data:` URL. The
//! payload is decoded, size-checked and sniffed so only real images reach
//! the CDN. The declared media type of a `data:` URL is ignored.

use base64::{Engine, engine::general_purpose::STANDARD};
use thiserror::Error;

/// Largest accepted image after decoding.
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Default request body limit for an upload: two maximum-size images as
/// base64 plus room for `data:` prefixes and the JSON envelope.
pub const MAX_UPLOAD_BODY_BYTES: usize = 2 * base64_len(MAX_IMAGE_BYTES) + 64 * 1024;

const fn base64_len(bytes: usize) -> usize {
    bytes.div_ceil(3) * 4
}

/// Errors that can occur when reading an image payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("image is required")]
    Empty,

    #[error("image is not valid base64")]
    InvalidBase64,

    #[error("image must be at most {max} bytes")]
    TooLarge { max: usize },

    #[error("image must be JPEG, PNG, WebP or HEIC")]
    UnsupportedType,
}

/// Image formats accepted from the photo capture page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
    Heic,
}

impl ImageKind {
    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Heic => "image/heic",
        }
    }

    /// Identify an image from its leading bytes.
    #[must_use]
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        const HEIF_BRANDS: [&[u8]; 7] = [
            b"heic", b"heix", b"heim", b"heis", b"hevc", b"mif1", b"msf1",
        ];

        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            return Some(Self::Png);
        }
        if bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WEBP".as_slice()) {
            return Some(Self::Webp);
        }
        if bytes.get(4..8) == Some(b"ftyp".as_slice())
            && bytes
                .get(8..12)
                .is_some_and(|brand| HEIF_BRANDS.contains(&brand))
        {
            return Some(Self::Heic);
        }
        None
    }
}

/// A decoded and validated image.
#[derive(Debug, Clone)]
pub struct ImagePayload {
    kind: ImageKind,
    encoded: String,
    size: usize,
}

impl ImagePayload {
    /// Parse a base64 payload, with or without a `data:` URL prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is empty, not base64, larger than
    /// [`MAX_IMAGE_BYTES`], or not a supported image format.
    pub fn parse(input: &str) -> Result<Self, ImageError> {
        let input = input.trim();
        let data = match input.strip_prefix("data:") {
            Some(rest) => rest
                .split_once(',')
                .map(|(_, data)| data)
                .ok_or(ImageError::InvalidBase64)?,
            None => input,
        };

        let encoded: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        if encoded.is_empty() {
            return Err(ImageError::Empty);
        }
        // Reject before allocating the decoded buffer
        if encoded.len() / 4 * 3 > MAX_IMAGE_BYTES + 3 {
            return Err(ImageError::TooLarge {
                max: MAX_IMAGE_BYTES,
            });
        }

        let bytes = STANDARD
            .decode(encoded.as_bytes())
            .map_err(|_| ImageError::InvalidBase64)?;
        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(ImageError::TooLarge {
                max: MAX_IMAGE_BYTES,
            });
        }
        let kind = ImageKind::sniff(&bytes).ok_or(ImageError::UnsupportedType)?;

        Ok(Self {
            kind,
            encoded,
            size: bytes.len(),
        })
    }

    #[must_use]
    pub const fn kind(&self) -> ImageKind {
        self.kind
    }

    /// Decoded size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// The image as a `data:` URL with the sniffed media type.
    #[must_use]
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.kind.mime_type(), self.encoded)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";
    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

    #[test]
    fn test_sniff() {
        assert_eq!(ImageKind::sniff(PNG), Some(ImageKind::Png));
        assert_eq!(ImageKind::sniff(JPEG), Some(ImageKind::Jpeg));
        assert_eq!(
            ImageKind::sniff(b"RIFF\x24\0\0\0WEBPVP8 "),
            Some(ImageKind::Webp)
        );
        assert_eq!(
            ImageKind::sniff(b"\0\0\0\x18ftypheic\0\0\0\0"),
            Some(ImageKind::Heic)
        );
        assert_eq!(ImageKind::sniff(b"GIF89a"), None);
        assert_eq!(ImageKind::sniff(b""), None);
    }

    #[test]
    fn test_parse_plain_base64() {
        let image = ImagePayload::parse(&STANDARD.encode(JPEG)).unwrap();
        assert_eq!(image.kind(), ImageKind::Jpeg);
        assert_eq!(image.size(), JPEG.len());
    }

    #[test]
    fn test_parse_data_url_uses_sniffed_type() {
        let input = format!("data:image/jpeg;base64,{}", STANDARD.encode(PNG));
        let image = ImagePayload::parse(&input).unwrap();
        assert_eq!(image.kind(), ImageKind::Png);
        assert!(image.data_uri().starts_with("data:image/png;base64,"));
    }

    #[test]
    fn test_parse_ignores_line_breaks() {
        let encoded = STANDARD.encode(PNG);
        let (a, b) = encoded.split_at(8);
        let image = ImagePayload::parse(&format!("{a}\n{b}\n")).unwrap();
        assert_eq!(image.kind(), ImageKind::Png);
    }

    #[test]
    fn test_parse_rejects() {
        assert_eq!(ImagePayload::parse("").unwrap_err(), ImageError::Empty);
        assert_eq!(
            ImagePayload::parse("data:image/png;base64,").unwrap_err(),
            ImageError::Empty
        );
        assert_eq!(
            ImagePayload::parse("not base64!!").unwrap_err(),
            ImageError::InvalidBase64
        );
        assert_eq!(
            ImagePayload::parse(&STANDARD.encode(b"plain text")).unwrap_err(),
            ImageError::UnsupportedType
        );
    }

    #[test]
    fn test_default_body_limit_fits_two_max_images() {
        let image = "A".repeat(base64_len(MAX_IMAGE_BYTES));
        let body = serde_json::json!({
            "token": "t".repeat(64),
            "frontImage": format!("data:image/heic;base64,{image}"),
            "rearImage": format!("data:image/heic;base64,{image}"),
        })
        .to_string();
        assert!(body.len() <= MAX_UPLOAD_BODY_BYTES);
        assert_eq!(STANDARD.encode(vec![0u8; MAX_IMAGE_BYTES]).len(), image.len());
    }

    #[test]
    fn test_parse_rejects_oversized() {
        let mut big = JPEG.to_vec();
        big.resize(MAX_IMAGE_BYTES + 1, 0);
        assert_eq!(
            ImagePayload::parse(&STANDARD.encode(&big)).unwrap_err(),
            ImageError::TooLarge {
                max: MAX_IMAGE_BYTES
            }
        );
    }
}
