//! Media types, file extensions and format conversion for embedded images.

use super::source::url_extension;
use image::ImageFormat;
use std::io::Cursor;

/// Media type of a fetched image: the server's `Content-Type` when it names an
/// image, else a guess from the URL extension, else `image/jpeg`.
pub fn resolve_media_type(content_type: Option<&str>, url_path: Option<&str>) -> String {
    content_type
        .and_then(image_mime_from_content_type)
        .or_else(|| url_path.and_then(url_extension).and_then(|ext| mime_from_extension(&ext)).map(str::to_string))
        .unwrap_or_else(|| "image/jpeg".to_string())
}

/// `image/*` media type from a `Content-Type` header value, normalized.
pub fn image_mime_from_content_type(value: &str) -> Option<String> {
    let mime = value.split(';').next()?.trim().to_ascii_lowercase();
    if !mime.starts_with("image/") || mime.len() <= "image/".len() {
        return None;
    }
    Some(match mime.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/x-png" => "image/png".to_string(),
        "image/x-ms-bmp" => "image/bmp".to_string(),
        _ => mime,
    })
}

pub fn mime_from_extension(ext: &str) -> Option<&'static str> {
    Some(match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "avif" => "image/avif",
        "ico" => "image/x-icon",
        _ => return None,
    })
}

/// File extension used for an embedded asset of this media type.
pub fn extension_for_mime(mime: &str) -> String {
    let known = match mime {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        "image/bmp" => Some("bmp"),
        "image/tiff" => Some("tif"),
        "image/avif" => Some("avif"),
        "image/x-icon" | "image/vnd.microsoft.icon" => Some("ico"),
        _ => None,
    };
    if let Some(ext) = known {
        return ext.to_string();
    }
    let subtype: String = mime
        .strip_prefix("image/")
        .unwrap_or("")
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();
    if subtype.is_empty() { "img".to_string() } else { subtype }
}

/// BMP and TIFF are not EPUB core media types.
pub fn needs_transcode(mime: &str) -> bool {
    matches!(mime, "image/bmp" | "image/tiff")
}

pub fn transcode_to_png(data: &[u8]) -> Result<Vec<u8>, image::ImageError> {
    let decoded = image::load_from_memory(data)?;
    let mut out = Cursor::new(Vec::new());
    decoded.write_to(&mut out, ImageFormat::Png)?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn bmp_bytes() -> Vec<u8> {
        let img = RgbImage::from_pixel(3, 2, Rgb([10, 20, 30]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Bmp).unwrap();
        out.into_inner()
    }

    #[test]
    fn content_type_wins_when_it_is_an_image() {
        assert_eq!(
            resolve_media_type(Some("image/webp; charset=binary"), Some("/a.jpg")),
            "image/webp"
        );
    }

    #[test]
    fn non_image_content_type_falls_back_to_extension() {
        assert_eq!(
            resolve_media_type(Some("application/octet-stream"), Some("/a/b.PNG")),
            "image/png"
        );
        assert_eq!(resolve_media_type(None, Some("/a/b.gif")), "image/gif");
    }

    #[test]
    fn unknown_everything_is_jpeg() {
        assert_eq!(resolve_media_type(Some("text/html"), Some("/photo")), "image/jpeg");
        assert_eq!(resolve_media_type(None, None), "image/jpeg");
    }

    #[test]
    fn normalizes_legacy_names() {
        assert_eq!(image_mime_from_content_type("IMAGE/JPG"), Some("image/jpeg".into()));
        assert_eq!(image_mime_from_content_type("image/"), None);
    }

    #[test]
    fn extensions() {
        assert_eq!(extension_for_mime("image/jpeg"), "jpg");
        assert_eq!(extension_for_mime("image/svg+xml"), "svg");
        assert_eq!(extension_for_mime("image/heic"), "heic");
        assert_eq!(extension_for_mime("image/"), "img");
    }

    #[test]
    fn bmp_transcodes_to_png() {
        let png = transcode_to_png(&bmp_bytes()).unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
        let back = image::load_from_memory(&png).unwrap().to_rgb8();
        assert_eq!(back.get_pixel(2, 1), &Rgb([10, 20, 30]));
    }

    #[test]
    fn garbage_does_not_transcode() {
        assert!(transcode_to_png(b"not an image").is_err());
    }
}
