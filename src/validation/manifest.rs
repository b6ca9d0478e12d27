//! HLS manifest classification.
//!
//! A stream counts as working when its body is an HLS playlist a browser
//! player can start: a master playlist with at least one playable variant,
//! or a media playlist with at least one segment.

use m3u8_rs::Playlist;

use crate::errors::ProbeFailure;
use crate::models::StreamKind;

const HLS_HEADER: &[u8] = b"#EXTM3U";
const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Codec prefixes hls.js can play in every mainstream browser
const PLAYABLE_CODECS: &[&str] = &["avc", "h264", "mp4a", "aac"];

/// Classify a (possibly truncated) manifest body.
///
/// `truncated` means the body was cut at the read limit; everything after
/// the last complete line is discarded before parsing.
pub fn classify_manifest(body: &[u8], truncated: bool) -> Result<StreamKind, ProbeFailure> {
    let body = if truncated {
        match body.iter().rposition(|b| *b == b'\n') {
            Some(end) => &body[..=end],
            None => &[][..],
        }
    } else {
        body
    };
    let body = body.strip_prefix(UTF8_BOM).unwrap_or(body);
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    let body = &body[start..];

    if !body.starts_with(HLS_HEADER) {
        return Err(ProbeFailure::Manifest("missing #EXTM3U header".to_string()));
    }

    match m3u8_rs::parse_playlist_res(body) {
        Ok(Playlist::MasterPlaylist(master)) => {
            let variants: Vec<_> = master.variants.iter().filter(|v| !v.is_i_frame).collect();
            if variants.is_empty() {
                return Err(ProbeFailure::Unsupported(
                    "master playlist has no variants".to_string(),
                ));
            }

            let declared: Vec<&str> = variants
                .iter()
                .filter_map(|v| v.codecs.as_deref())
                .flat_map(|codecs| codecs.split(','))
                .map(str::trim)
                .filter(|codec| !codec.is_empty())
                .collect();
            if !declared.is_empty() && !declared.iter().any(|codec| is_playable(codec)) {
                return Err(ProbeFailure::Unsupported(format!(
                    "no playable codecs in {}",
                    declared.join(",")
                )));
            }

            Ok(StreamKind::MasterPlaylist {
                variants: variants.len(),
            })
        }
        Ok(Playlist::MediaPlaylist(media)) => {
            if media.segments.is_empty() {
                return Err(ProbeFailure::Unsupported(
                    "media playlist has no segments".to_string(),
                ));
            }
            Ok(StreamKind::MediaPlaylist {
                segments: media.segments.len(),
            })
        }
        Err(_) => Err(ProbeFailure::Manifest("invalid playlist syntax".to_string())),
    }
}

fn is_playable(codec: &str) -> bool {
    let codec = codec.to_ascii_lowercase();
    PLAYABLE_CODECS.iter().any(|prefix| codec.starts_with(prefix))
}
