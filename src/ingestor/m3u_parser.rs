//! Extended M3U playlist parsing.
//!
//! Turns `#EXTINF` entries into [`ChannelRecord`]s. Attribute values are
//! taken as-is apart from language and country, which are resolved to codes
//! through the dimension directory.

use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

use crate::catalog::DimensionDirectory;
use crate::models::ChannelRecord;

/// Language code for channels whose playlist entry names none
pub const UNDETERMINED_LANGUAGE: &str = "und";
/// Country code for channels not tied to one country
pub const INTERNATIONAL_COUNTRY: &str = "int";

#[derive(Debug, Default)]
struct PendingEntry {
    title: String,
    attributes: HashMap<String, String>,
    group: Option<String>,
}

/// Parse playlist text into channel records, skipping repeated stream URLs.
pub fn parse_playlist(content: &str, directory: &DimensionDirectory) -> Vec<ChannelRecord> {
    let mut records = Vec::new();
    let mut pending: Option<PendingEntry> = None;
    let mut seen_urls = HashSet::new();
    let mut duplicate_count = 0;

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(extinf) = line.strip_prefix("#EXTINF:") {
            pending = Some(parse_extinf_line(extinf));
            continue;
        }
        if let Some(group) = line.strip_prefix("#EXTGRP:") {
            if let Some(entry) = pending.as_mut() {
                entry.group.get_or_insert_with(|| group.trim().to_string());
            }
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        if !seen_urls.insert(line.to_string()) {
            duplicate_count += 1;
            debug!("Skipping duplicate stream URL at line {}: {}", line_num + 1, line);
            pending = None;
            continue;
        }

        let record = match pending.take() {
            Some(entry) => complete_record(entry, line, directory),
            None => {
                debug!("Stream URL without EXTINF metadata at line {}: {}", line_num + 1, line);
                basic_record(line)
            }
        };
        records.push(record);
    }

    if duplicate_count > 0 {
        info!("Skipped {} duplicate playlist entries", duplicate_count);
    }
    debug!("Parsed {} channel records", records.len());
    records
}

/// Split `-1 tvg-id="x" group-title="a,b",Title` into attributes and title.
/// The title starts after the first comma outside quotes.
fn parse_extinf_line(extinf: &str) -> PendingEntry {
    let mut in_quotes = false;
    let mut split_at = None;
    for (i, ch) in extinf.char_indices() {
        match ch {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                split_at = Some(i);
                break;
            }
            _ => {}
        }
    }

    let (attrs_part, title) = match split_at {
        Some(i) => (&extinf[..i], extinf[i + 1..].trim()),
        None => (extinf, ""),
    };
    let attributes = parse_extinf_attributes(attrs_part);
    let group = attributes.get("group-title").cloned();

    PendingEntry {
        title: title.to_string(),
        attributes,
        group,
    }
}

/// Parse `key="value"` and `key=value` pairs. The leading duration is skipped.
fn parse_extinf_attributes(attrs_part: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    let mut chars = attrs_part.chars().peekable();
    let mut key = String::new();
    let mut value = String::new();
    let mut in_key = false;
    let mut in_value = false;
    let mut in_quotes = false;

    let mut flush = |key: &mut String, value: &mut String| {
        let k = key.trim().to_lowercase();
        if !k.is_empty() && !value.trim().is_empty() {
            attributes.insert(k, value.trim().to_string());
        }
        key.clear();
        value.clear();
    };

    while let Some(ch) = chars.next() {
        match ch {
            ' ' | '\t' if !in_quotes => {
                if in_value {
                    flush(&mut key, &mut value);
                    in_value = false;
                }
                key.clear();
                in_key = true;
            }
            '=' if !in_quotes && in_key => {
                in_key = false;
                in_value = true;
                if chars.peek() == Some(&'"') {
                    chars.next();
                    in_quotes = true;
                }
            }
            '"' if in_value => {
                in_quotes = false;
                in_value = false;
                flush(&mut key, &mut value);
            }
            _ => {
                if in_key {
                    key.push(ch);
                } else if in_value {
                    value.push(ch);
                }
            }
        }
    }
    if in_value {
        flush(&mut key, &mut value);
    }
    attributes
}

/// First entry of a `;`-separated attribute value
fn first_value(value: &str) -> Option<String> {
    value
        .split(';')
        .map(str::trim)
        .find(|v| !v.is_empty())
        .map(str::to_string)
}

fn complete_record(entry: PendingEntry, url: &str, directory: &DimensionDirectory) -> ChannelRecord {
    let attribute = |name: &str| entry.attributes.get(name).and_then(|v| first_value(v));

    let name = if entry.title.is_empty() {
        attribute("tvg-name").unwrap_or_else(|| name_from_url(url))
    } else {
        entry.title.clone()
    };
    let language = attribute("tvg-language")
        .map(|l| directory.resolve_language(&l))
        .unwrap_or_else(|| UNDETERMINED_LANGUAGE.to_string());
    let country = attribute("tvg-country")
        .map(|c| directory.resolve_country(&c))
        .unwrap_or_else(|| INTERNATIONAL_COUNTRY.to_string());

    ChannelRecord {
        url: url.to_string(),
        name,
        logo: attribute("tvg-logo"),
        language: Some(language),
        country: Some(country),
        subdivision: attribute("tvg-subdivision"),
        city: attribute("tvg-city"),
        group: entry.group.clone().and_then(|g| first_value(&g)),
    }
}

fn basic_record(url: &str) -> ChannelRecord {
    ChannelRecord {
        url: url.to_string(),
        name: name_from_url(url),
        language: Some(UNDETERMINED_LANGUAGE.to_string()),
        country: Some(INTERNATIONAL_COUNTRY.to_string()),
        ..Default::default()
    }
}

fn name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("Unnamed Channel")
        .to_string()
}
