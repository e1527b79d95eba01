use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::{DynamicImage, ImageFormat, RgbaImage};

use super::error::SegmentError;

pub const PNG_MIME: &str = "image/png";

pub fn png_bytes(image: &DynamicImage) -> Result<Vec<u8>, image::ImageError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

pub fn to_data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

/// Accepts either a `data:<mime>;base64,<payload>` URI or bare base64.
/// Returns the mime (if the URI carried one) and the decoded bytes.
pub fn decode_payload(value: &str) -> Result<(Option<String>, Vec<u8>), SegmentError> {
    let value = value.trim();
    let (mime, encoded) = match value.strip_prefix("data:") {
        Some(rest) => {
            let (header, encoded) = rest.split_once(',').ok_or_else(|| {
                SegmentError::InvalidPayload("data URI has no ',' separator".to_string())
            })?;
            if !header.ends_with(";base64") {
                return Err(SegmentError::InvalidPayload(
                    "only base64 data URIs are supported".to_string(),
                ));
            }
            let mime = header.trim_end_matches(";base64").trim();
            let mime = (!mime.is_empty()).then(|| mime.to_string());
            (mime, encoded)
        }
        None => (None, value),
    };
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|err| SegmentError::InvalidPayload(format!("invalid base64: {}", err)))?;
    Ok((mime, bytes))
}

/// Decodes an encoded page (PNG, JPEG, ...) into RGBA pixels.
pub fn decode_page(bytes: &[u8]) -> Result<RgbaImage, SegmentError> {
    let image = image::load_from_memory(bytes).map_err(SegmentError::ImageDecode)?;
    let rgba = image.to_rgba8();
    if rgba.width() == 0 || rgba.height() == 0 {
        return Err(SegmentError::EmptyImage {
            width: rgba.width(),
            height: rgba.height(),
        });
    }
    Ok(rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn data_uri_and_bare_base64_decode_alike() {
        let uri = to_data_uri(PNG_MIME, b"abc");
        let (mime, bytes) = decode_payload(&uri).unwrap();
        assert_eq!(mime.as_deref(), Some(PNG_MIME));
        assert_eq!(bytes, b"abc");

        let (mime, bytes) = decode_payload(&BASE64.encode(b"abc")).unwrap();
        assert_eq!(mime, None);
        assert_eq!(bytes, b"abc");
    }

    #[test]
    fn malformed_payloads_are_input_errors() {
        let err = decode_payload("data:image/png;base64").unwrap_err();
        assert!(err.is_input_error());
        let err = decode_payload("data:text/plain,hello").unwrap_err();
        assert!(err.is_input_error());
        let err = decode_payload("%%%").unwrap_err();
        assert!(err.is_input_error());
    }

    #[test]
    fn png_round_trips_through_decode_page() {
        let gray = GrayImage::from_pixel(4, 3, Luma([7]));
        let bytes = png_bytes(&DynamicImage::ImageLuma8(gray)).unwrap();
        let page = decode_page(&bytes).unwrap();
        assert_eq!(page.dimensions(), (4, 3));
        assert_eq!(page.get_pixel(0, 0).0, [7, 7, 7, 255]);
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        assert!(matches!(
            decode_page(b"not an image"),
            Err(SegmentError::ImageDecode(_))
        ));
    }
}
