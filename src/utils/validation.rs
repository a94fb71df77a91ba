/// Image MIME types the ingestion endpoint accepts.
pub const ALLOWED_IMAGE_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
    "image/tiff",
];

/// Detects the image MIME type from the file's leading bytes. Returns
/// `None` when the bytes are not a recognizable, allowed image format.
pub fn detect_image_mime(header: &[u8]) -> Option<&'static str> {
    let kind = infer::get(header)?;
    ALLOWED_IMAGE_MIME_TYPES
        .iter()
        .find(|mime| **mime == kind.mime_type())
        .copied()
}

pub fn is_allowed_image(header: &[u8]) -> bool {
    detect_image_mime(header).is_some()
}

/// Extension for the generated stored name. Prefers the client-supplied
/// filename, falling back to the detected type; only plain alphanumeric
/// extensions survive so the staged path stays shell- and URL-safe.
pub fn sanitized_extension(original_name: &str, data: &[u8]) -> String {
    let from_name = original_name
        .rsplit('.')
        .next()
        .filter(|ext| {
            !ext.is_empty()
                && ext.len() <= 5
                && !original_name.starts_with('.')
                && original_name.contains('.')
                && ext.chars().all(|c| c.is_ascii_alphanumeric())
        })
        .map(|ext| ext.to_ascii_lowercase());

    from_name
        .or_else(|| infer::get(data).map(|kind| kind.extension().to_string()))
        .unwrap_or_else(|| "bin".to_string())
}
