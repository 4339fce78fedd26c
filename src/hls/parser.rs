//! Segment reference extraction from HLS manifests.
//!
//! This is deliberately not a full playlist parser: a line counts as a
//! segment reference when it ends in a media-segment (`.ts`) or nested
//! manifest (`.m3u8`) suffix. Tags, comments and blank lines fall out of
//! that check on their own.

use tracing::debug;
use url::Url;

const SEGMENT_SUFFIXES: &[&str] = &[".ts", ".m3u8"];

/// Whether a manifest line refers to a segment or nested manifest.
pub fn is_segment_reference(line: &str) -> bool {
    SEGMENT_SUFFIXES.iter().any(|suffix| line.ends_with(suffix))
}

fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\u{000B}' | '\u{000C}' | '\u{0085}' | '\u{2028}' | '\u{2029}'
    )
}

/// Extract resolved segment URLs from manifest bytes, in manifest order.
///
/// Relative references are resolved against `base_url` (the manifest's own
/// URL). Undecodable manifests yield an empty list and unresolvable lines
/// are skipped.
pub fn parse_segments(manifest: &[u8], base_url: &Url) -> Vec<Url> {
    let Ok(text) = std::str::from_utf8(manifest) else {
        debug!("Manifest from {} is not valid UTF-8, no segments", base_url);
        return Vec::new();
    };

    text.split(is_line_break)
        .map(str::trim)
        .filter(|line| is_segment_reference(line))
        .filter_map(|line| resolve(line, base_url))
        .collect()
}

fn resolve(reference: &str, base_url: &Url) -> Option<Url> {
    match base_url.join(reference).or_else(|_| Url::parse(reference)) {
        Ok(url) => Some(url),
        Err(e) => {
            debug!("Skipping unresolvable segment reference {:?}: {}", reference, e);
            None
        }
    }
}
