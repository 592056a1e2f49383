//! Filename → media category classification.

use crate::types::MediaType;

/// Extensions treated as images.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "svg", "webp", "tiff", "tif", "ico",
];

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "wmv", "flv", "mkv", "webm", "mpg", "mpeg"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "flac", "aac", "ogg", "wma", "m4a"];
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "hwp", "hwpx", "txt", "rtf", "zip",
];

/// Last dot-delimited segment of a filename, lowercased.
///
/// Returns `None` when the name has no dot or ends with one.
pub fn extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Map a filename to its media category.
pub fn media_type(file_name: &str) -> MediaType {
    let Some(ext) = extension(file_name) else {
        return MediaType::Unknown;
    };
    let ext = ext.as_str();
    if IMAGE_EXTENSIONS.contains(&ext) {
        MediaType::Image
    } else if VIDEO_EXTENSIONS.contains(&ext) {
        MediaType::Video
    } else if AUDIO_EXTENSIONS.contains(&ext) {
        MediaType::Audio
    } else if DOCUMENT_EXTENSIONS.contains(&ext) {
        MediaType::Document
    } else {
        MediaType::Unknown
    }
}

/// Whether a filename names an image. Absent or empty names are never images.
pub fn is_image(file_name: Option<&str>) -> bool {
    match file_name {
        Some(name) if !name.trim().is_empty() => media_type(name.trim()) == MediaType::Image,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_image_extension_is_image() {
        for ext in IMAGE_EXTENSIONS {
            assert!(is_image(Some(&format!("photo.{ext}"))), "{ext}");
            assert!(is_image(Some(&format!("PHOTO.{}", ext.to_uppercase()))), "{ext}");
        }
    }

    #[test]
    fn test_non_images() {
        assert!(!is_image(Some("report.pdf")));
        assert!(!is_image(Some("README")));
        assert!(!is_image(Some("archive.tar.gz")));
        assert!(!is_image(Some("trailing.")));
        assert!(!is_image(Some("")));
        assert!(!is_image(None));
    }

    #[test]
    fn test_categories() {
        assert_eq!(media_type("clip.MP4"), MediaType::Video);
        assert_eq!(media_type("song.mp3"), MediaType::Audio);
        assert_eq!(media_type("minutes.hwp"), MediaType::Document);
        assert_eq!(media_type("scan.tif"), MediaType::Image);
        assert_eq!(media_type("data.xyz"), MediaType::Unknown);
        assert_eq!(media_type("noext"), MediaType::Unknown);
    }

    #[test]
    fn test_extension_uses_last_segment() {
        assert_eq!(extension("a.b.JPEG").as_deref(), Some("jpeg"));
        assert_eq!(extension("plain"), None);
    }
}
