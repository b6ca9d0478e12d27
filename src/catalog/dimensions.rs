//! Dimension naming, consistency rules and per-load aggregates.
//!
//! The [`DimensionDirectory`] supplies display names (and the parent country
//! of known subdivisions and cities). The [`DimensionIndex`] is the set of
//! aggregates computed once per catalog load.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

use crate::errors::{IngestionError, IngestionResult, LoadError};
use crate::models::{Channel, Dimension, DimensionEntry};

#[derive(Debug, Clone, Deserialize)]
struct NamedCode {
    code: String,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CountryListing {
    code: String,
    name: String,
    #[serde(default)]
    subdivisions: Vec<NamedCode>,
    #[serde(default)]
    cities: Vec<NamedCode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    languages: Vec<NamedCode>,
    #[serde(default)]
    countries: Vec<CountryListing>,
}

/// Display names for dimension codes.
///
/// Codes are stored lowercase. A code missing from the directory is shown
/// as its uppercase form.
#[derive(Debug, Clone, Default)]
pub struct DimensionDirectory {
    languages: HashMap<String, String>,
    countries: HashMap<String, String>,
    subdivisions: HashMap<String, (String, String)>,
    cities: HashMap<String, (String, String)>,
    language_by_name: HashMap<String, String>,
    country_by_name: HashMap<String, String>,
}

impl DimensionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the directory JSON format:
    /// `{"languages": [{"code", "name"}], "countries": [{"code", "name", "subdivisions": [...], "cities": [...]}]}`
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let file: DirectoryFile = serde_json::from_str(json)?;
        let mut directory = Self::new();
        for language in file.languages {
            directory = directory.with_language(&language.code, &language.name);
        }
        for country in file.countries {
            directory = directory.with_country(&country.code, &country.name);
            for subdivision in country.subdivisions {
                directory =
                    directory.with_subdivision(&subdivision.code, &subdivision.name, &country.code);
            }
            for city in country.cities {
                directory = directory.with_city(&city.code, &city.name, &country.code);
            }
        }
        Ok(directory)
    }

    pub async fn from_json_file(path: &Path) -> IngestionResult<Self> {
        let directory_error = |message: String| IngestionError::Directory {
            path: path.display().to_string(),
            message,
        };
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| directory_error(e.to_string()))?;
        Self::from_json_str(&contents).map_err(|e| directory_error(e.to_string()))
    }

    pub fn with_language(mut self, code: &str, name: &str) -> Self {
        let code = normalize_code(code);
        self.language_by_name
            .insert(name.trim().to_lowercase(), code.clone());
        self.languages.insert(code, name.trim().to_string());
        self
    }

    pub fn with_country(mut self, code: &str, name: &str) -> Self {
        let code = normalize_code(code);
        self.country_by_name
            .insert(name.trim().to_lowercase(), code.clone());
        self.countries.insert(code, name.trim().to_string());
        self
    }

    pub fn with_subdivision(mut self, code: &str, name: &str, country: &str) -> Self {
        self.subdivisions.insert(
            normalize_code(code),
            (name.trim().to_string(), normalize_code(country)),
        );
        self
    }

    pub fn with_city(mut self, code: &str, name: &str, country: &str) -> Self {
        self.cities.insert(
            normalize_code(code),
            (name.trim().to_string(), normalize_code(country)),
        );
        self
    }

    pub fn is_empty(&self) -> bool {
        self.languages.is_empty()
            && self.countries.is_empty()
            && self.subdivisions.is_empty()
            && self.cities.is_empty()
    }

    pub fn display_name(&self, dimension: Dimension, code: &str) -> String {
        let known = match dimension {
            Dimension::Language => self.languages.get(code),
            Dimension::Country => self.countries.get(code),
            Dimension::Subdivision => self.subdivisions.get(code).map(|(name, _)| name),
            Dimension::City => self.cities.get(code).map(|(name, _)| name),
        };
        known.cloned().unwrap_or_else(|| code.to_uppercase())
    }

    /// Country the directory places a subdivision or city in, if known
    pub fn parent_country(&self, dimension: Dimension, code: &str) -> Option<&str> {
        match dimension {
            Dimension::Subdivision => self.subdivisions.get(code),
            Dimension::City => self.cities.get(code),
            _ => None,
        }
        .map(|(_, country)| country.as_str())
    }

    /// Map a playlist language value (code or name) to a language code
    pub fn resolve_language(&self, value: &str) -> String {
        resolve(value, &self.languages, &self.language_by_name)
    }

    /// Map a playlist country value (code or name) to a country code
    pub fn resolve_country(&self, value: &str) -> String {
        resolve(value, &self.countries, &self.country_by_name)
    }
}

fn resolve(
    value: &str,
    by_code: &HashMap<String, String>,
    by_name: &HashMap<String, String>,
) -> String {
    let normalized = normalize_code(value);
    if by_code.contains_key(&normalized) {
        return normalized;
    }
    by_name.get(&normalized).cloned().unwrap_or(normalized)
}

pub(crate) fn normalize_code(code: &str) -> String {
    code.trim().to_lowercase()
}

/// Check that a channel's subdivision and city belong to its country.
///
/// The directory decides when it knows the code. Otherwise subdivision
/// codes must carry the `cc-` prefix and city codes the `cc` prefix.
pub(crate) fn check_consistency(
    directory: &DimensionDirectory,
    channel: &Channel,
) -> Result<(), LoadError> {
    if let Some(subdivision) = &channel.subdivision {
        if !belongs_to(directory, Dimension::Subdivision, subdivision, &channel.country) {
            return Err(LoadError::InconsistentSubdivision {
                url: channel.url.clone(),
                subdivision: subdivision.clone(),
                country: channel.country.clone(),
            });
        }
    }
    if let Some(city) = &channel.city {
        if !belongs_to(directory, Dimension::City, city, &channel.country) {
            return Err(LoadError::InconsistentCity {
                url: channel.url.clone(),
                city: city.clone(),
                country: channel.country.clone(),
            });
        }
    }
    Ok(())
}

fn belongs_to(directory: &DimensionDirectory, dimension: Dimension, code: &str, country: &str) -> bool {
    if let Some(parent) = directory.parent_country(dimension, code) {
        return parent == country;
    }
    match dimension {
        Dimension::Subdivision => code
            .split_once('-')
            .is_some_and(|(prefix, rest)| prefix == country && !rest.is_empty()),
        Dimension::City => code.len() > country.len() && code.starts_with(country),
        Dimension::Language | Dimension::Country => true,
    }
}

/// Counts gathered while channels are admitted into a snapshot.
#[derive(Debug, Default)]
pub(crate) struct DimensionAccumulator {
    languages: BTreeMap<String, usize>,
    countries: BTreeMap<String, usize>,
    subdivisions: BTreeMap<String, (String, usize)>,
    cities: BTreeMap<String, (String, usize)>,
    country_subdivisions: BTreeMap<String, BTreeSet<String>>,
}

impl DimensionAccumulator {
    pub(crate) fn record(&mut self, channel: &Channel) {
        *self.languages.entry(channel.language.clone()).or_default() += 1;
        *self.countries.entry(channel.country.clone()).or_default() += 1;
        if let Some(subdivision) = &channel.subdivision {
            self.subdivisions
                .entry(subdivision.clone())
                .or_insert_with(|| (channel.country.clone(), 0))
                .1 += 1;
            self.country_subdivisions
                .entry(channel.country.clone())
                .or_default()
                .insert(subdivision.clone());
        }
        if let Some(city) = &channel.city {
            self.cities
                .entry(city.clone())
                .or_insert_with(|| (channel.country.clone(), 0))
                .1 += 1;
        }
    }

    pub(crate) fn finish(mut self, directory: &DimensionDirectory) -> DimensionIndex {
        let languages: Vec<DimensionEntry> = self
            .languages
            .into_iter()
            .map(|(code, count)| DimensionEntry {
                name: directory.display_name(Dimension::Language, &code),
                code,
                channel_count: count,
                country: None,
                subdivisions: Vec::new(),
            })
            .collect();
        let countries: Vec<DimensionEntry> = self
            .countries
            .into_iter()
            .map(|(code, count)| DimensionEntry {
                name: directory.display_name(Dimension::Country, &code),
                subdivisions: self
                    .country_subdivisions
                    .remove(&code)
                    .map(|set| set.into_iter().collect())
                    .unwrap_or_default(),
                code,
                channel_count: count,
                country: None,
            })
            .collect();
        let subdivisions = scoped_entries(directory, Dimension::Subdivision, self.subdivisions);
        let cities = scoped_entries(directory, Dimension::City, self.cities);

        DimensionIndex::new(languages, countries, subdivisions, cities)
    }
}

fn scoped_entries(
    directory: &DimensionDirectory,
    dimension: Dimension,
    counts: BTreeMap<String, (String, usize)>,
) -> Vec<DimensionEntry> {
    counts
        .into_iter()
        .map(|(code, (country, count))| DimensionEntry {
            name: directory.display_name(dimension, &code),
            code,
            channel_count: count,
            country: Some(country),
            subdivisions: Vec::new(),
        })
        .collect()
}

/// Precomputed dimension aggregates for one snapshot. Each list is ordered
/// by display name, then code.
#[derive(Debug, Clone, Default)]
pub struct DimensionIndex {
    lists: HashMap<Dimension, Vec<DimensionEntry>>,
    positions: HashMap<Dimension, HashMap<String, usize>>,
}

impl DimensionIndex {
    fn new(
        languages: Vec<DimensionEntry>,
        countries: Vec<DimensionEntry>,
        subdivisions: Vec<DimensionEntry>,
        cities: Vec<DimensionEntry>,
    ) -> Self {
        let mut index = Self::default();
        for (dimension, mut entries) in [
            (Dimension::Language, languages),
            (Dimension::Country, countries),
            (Dimension::Subdivision, subdivisions),
            (Dimension::City, cities),
        ] {
            entries.sort_by(|a, b| {
                a.name
                    .to_lowercase()
                    .cmp(&b.name.to_lowercase())
                    .then_with(|| a.code.cmp(&b.code))
            });
            let positions = entries
                .iter()
                .enumerate()
                .map(|(i, entry)| (entry.code.clone(), i))
                .collect();
            index.positions.insert(dimension, positions);
            index.lists.insert(dimension, entries);
        }
        index
    }

    pub fn entries(&self, dimension: Dimension) -> &[DimensionEntry] {
        self.lists.get(&dimension).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, dimension: Dimension, code: &str) -> Option<&DimensionEntry> {
        let position = *self.positions.get(&dimension)?.get(&normalize_code(code))?;
        self.lists.get(&dimension)?.get(position)
    }

    /// Look an entry up by code, or failing that by display name
    /// (case-insensitive), so both "in" and "India" find the same country
    pub fn find(&self, dimension: Dimension, code_or_name: &str) -> Option<&DimensionEntry> {
        let needle = code_or_name.trim();
        self.get(dimension, needle).or_else(|| {
            let name = needle.to_lowercase();
            self.entries(dimension)
                .iter()
                .find(|entry| entry.name.to_lowercase() == name)
        })
    }

    /// Display name for a code, falling back to the uppercase code
    pub fn name_of(&self, dimension: Dimension, code: &str) -> String {
        self.get(dimension, code)
            .map(|entry| entry.name.clone())
            .unwrap_or_else(|| code.to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(country: &str, subdivision: Option<&str>, city: Option<&str>) -> Channel {
        Channel {
            url: "http://example.com/live.m3u8".to_string(),
            name: "Example".to_string(),
            logo: None,
            language: "eng".to_string(),
            country: country.to_string(),
            subdivision: subdivision.map(str::to_string),
            city: city.map(str::to_string),
            group: None,
        }
    }

    #[test]
    fn test_prefix_rules_without_directory() {
        let directory = DimensionDirectory::new();
        assert!(check_consistency(&directory, &channel("us", Some("us-ca"), Some("uslax"))).is_ok());
        assert!(matches!(
            check_consistency(&directory, &channel("us", Some("ca-on"), None)),
            Err(LoadError::InconsistentSubdivision { .. })
        ));
        assert!(matches!(
            check_consistency(&directory, &channel("us", None, Some("cator"))),
            Err(LoadError::InconsistentCity { .. })
        ));
    }

    #[test]
    fn test_directory_parent_overrides_prefix() {
        let directory = DimensionDirectory::new().with_subdivision("mh", "Maharashtra", "IN");
        assert!(check_consistency(&directory, &channel("in", Some("mh"), None)).is_ok());
        assert!(check_consistency(&directory, &channel("pk", Some("mh"), None)).is_err());
    }

    #[test]
    fn test_resolves_names_and_codes() {
        let directory = DimensionDirectory::new()
            .with_language("hin", "Hindi")
            .with_country("IN", "India");
        assert_eq!(directory.resolve_language("Hindi"), "hin");
        assert_eq!(directory.resolve_language("HIN"), "hin");
        assert_eq!(directory.resolve_language("Klingon"), "klingon");
        assert_eq!(directory.resolve_country("india"), "in");
        assert_eq!(directory.display_name(Dimension::Country, "in"), "India");
        assert_eq!(directory.display_name(Dimension::Country, "fr"), "FR");
    }

    #[test]
    fn test_directory_json_format() {
        let directory = DimensionDirectory::from_json_str(
            r#"{
                "languages": [{"code": "hin", "name": "Hindi"}],
                "countries": [{
                    "code": "IN", "name": "India",
                    "subdivisions": [{"code": "IN-MH", "name": "Maharashtra"}],
                    "cities": [{"code": "INBOM", "name": "Mumbai"}]
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(directory.display_name(Dimension::Subdivision, "in-mh"), "Maharashtra");
        assert_eq!(directory.parent_country(Dimension::City, "inbom"), Some("in"));
        assert!(!directory.is_empty());
    }

    #[test]
    fn test_accumulator_counts_and_country_subdivisions() {
        let directory = DimensionDirectory::new().with_country("us", "United States");
        let mut acc = DimensionAccumulator::default();
        acc.record(&channel("us", Some("us-ny"), Some("usnyc")));
        acc.record(&channel("us", Some("us-ca"), None));
        acc.record(&channel("us", Some("us-ca"), None));
        let index = acc.finish(&directory);

        let us = index.get(Dimension::Country, "US").unwrap();
        assert_eq!(us.channel_count, 3);
        assert_eq!(us.name, "United States");
        assert_eq!(us.subdivisions, vec!["us-ca", "us-ny"]);
        assert_eq!(index.get(Dimension::Subdivision, "us-ca").unwrap().channel_count, 2);
        assert_eq!(
            index.get(Dimension::City, "usnyc").unwrap().country.as_deref(),
            Some("us")
        );
        assert_eq!(index.entries(Dimension::Language).len(), 1);
    }

    #[test]
    fn test_find_by_code_or_name() {
        let directory = DimensionDirectory::new()
            .with_country("us", "United States")
            .with_subdivision("us-ny", "New York", "us");
        let mut acc = DimensionAccumulator::default();
        acc.record(&channel("us", Some("us-ny"), None));
        let index = acc.finish(&directory);

        assert_eq!(index.find(Dimension::Country, " US ").unwrap().code, "us");
        assert_eq!(index.find(Dimension::Country, "united states").unwrap().code, "us");
        assert_eq!(index.find(Dimension::Subdivision, "New York").unwrap().code, "us-ny");
        assert!(index.find(Dimension::Country, "Canada").is_none());
    }
}
