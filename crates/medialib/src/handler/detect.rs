use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Bytes read from the start of a file when sniffing its type.
const SNIFF_LEN: u64 = 64;

/// Detects a file's MIME type, by extension first, then by sniffing the
/// header for image formats.
pub fn detect_mime(path: &Path) -> Option<String> {
    if let Some(mime) = mime_guess::from_path(path).first() {
        return Some(mime.essence_str().to_string());
    }

    let mut header = Vec::with_capacity(SNIFF_LEN as usize);
    let file = File::open(path).ok()?;
    file.take(SNIFF_LEN).read_to_end(&mut header).ok()?;

    let format = image::guess_format(&header).ok()?;
    log::debug!("Sniffed {:?} for {}", format, path.display());
    Some(format.to_mime_type().to_string())
}

/// Preferred file extension (without dot) for a MIME type.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let preferred = match mime {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/tiff" => Some("tif"),
        "image/webp" => Some("webp"),
        "video/mp4" => Some("mp4"),
        "video/quicktime" => Some("mov"),
        "audio/mpeg" => Some("mp3"),
        "audio/flac" => Some("flac"),
        _ => None,
    };
    preferred.or_else(|| {
        mime_guess::get_mime_extensions_str(mime).and_then(|exts| exts.first().copied())
    })
}
