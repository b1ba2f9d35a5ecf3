use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use crate::error::{RegistryError, SourceError};

/// Longest accepted probe interval: one year.
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// A monitored endpoint and how often to probe it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Source {
    pub endpoint: Url,
    pub interval: Duration,
}

impl Source {
    /// Parse and validate a source. The interval is in whole seconds.
    pub fn new(endpoint: &str, interval_secs: i64) -> Result<Self, SourceError> {
        if interval_secs <= 0 {
            return Err(SourceError::NonPositiveInterval {
                endpoint: endpoint.to_string(),
                interval_secs,
            });
        }
        if interval_secs as u64 > MAX_INTERVAL_SECS {
            return Err(SourceError::IntervalTooLarge {
                endpoint: endpoint.to_string(),
                interval_secs: interval_secs as u64,
                max_secs: MAX_INTERVAL_SECS,
            });
        }
        let endpoint = parse_endpoint(endpoint)?;
        Ok(Self {
            endpoint,
            interval: Duration::from_secs(interval_secs as u64),
        })
    }

    pub fn validate(&self) -> Result<(), SourceError> {
        if self.interval.is_zero() {
            return Err(SourceError::NonPositiveInterval {
                endpoint: self.endpoint.to_string(),
                interval_secs: 0,
            });
        }
        if self.interval > Duration::from_secs(MAX_INTERVAL_SECS) {
            return Err(SourceError::IntervalTooLarge {
                endpoint: self.endpoint.to_string(),
                interval_secs: self.interval.as_secs(),
                max_secs: MAX_INTERVAL_SECS,
            });
        }
        check_scheme(&self.endpoint)
    }

    pub fn to_record(&self) -> SourceRecord {
        SourceRecord {
            url: self.endpoint.to_string(),
            frequency: self.interval.as_secs() as i64,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} every {}s", self.endpoint, self.interval.as_secs())
    }
}

impl TryFrom<SourceRecord> for Source {
    type Error = SourceError;

    fn try_from(record: SourceRecord) -> Result<Self, Self::Error> {
        Source::new(&record.url, record.frequency)
    }
}

/// On-disk form of a source: `{"url": ..., "frequency": seconds}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    pub url: String,
    pub frequency: i64,
}

fn parse_endpoint(raw: &str) -> Result<Url, SourceError> {
    let url = Url::parse(raw.trim()).map_err(|e| SourceError::MalformedEndpoint {
        endpoint: raw.to_string(),
        reason: e.to_string(),
    })?;
    check_scheme(&url)?;
    Ok(url)
}

fn check_scheme(url: &Url) -> Result<(), SourceError> {
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(SourceError::MalformedEndpoint {
            endpoint: url.to_string(),
            reason: format!("scheme must be http or https, got '{}'", other),
        }),
    }
}

/// Append-only, in-memory list of sources with JSON persistence.
#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: Vec<Source>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and append a source. Identical sources are allowed.
    pub fn add(&mut self, endpoint: &str, interval_secs: i64) -> Result<&Source, SourceError> {
        let source = Source::new(endpoint, interval_secs)?;
        self.sources.push(source);
        Ok(&self.sources[self.sources.len() - 1])
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn iter(&self) -> impl Iterator<Item = &Source> {
        self.sources.iter()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Load sources from a JSON array file, creating an empty file if none exists.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        if !path.exists() {
            info!(path = %path.display(), "Sources file not found, creating an empty one");
            let registry = Self::new();
            registry.save(path)?;
            return Ok(registry);
        }

        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let records: Vec<SourceRecord> =
            serde_json::from_str(&content).map_err(|source| RegistryError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let sources = records
            .into_iter()
            .map(Source::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        debug!(path = %path.display(), count = sources.len(), "Loaded sources");
        Ok(Self { sources })
    }

    pub fn save(&self, path: &Path) -> Result<(), RegistryError> {
        let records: Vec<SourceRecord> = self.sources.iter().map(Source::to_record).collect();
        let json = serde_json::to_string_pretty(&records).map_err(|source| RegistryError::Serialize {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

impl<'a> IntoIterator for &'a SourceRegistry {
    type Item = &'a Source;
    type IntoIter = std::slice::Iter<'a, Source>;

    fn into_iter(self) -> Self::IntoIter {
        self.sources.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_and_negative_intervals() {
        for secs in [0, -5] {
            let err = Source::new("https://example.com", secs).unwrap_err();
            assert!(matches!(err, SourceError::NonPositiveInterval { .. }), "{:?}", err);
        }
    }

    #[test]
    fn rejects_malformed_and_non_http_endpoints() {
        assert!(matches!(
            Source::new("not a url", 5),
            Err(SourceError::MalformedEndpoint { .. })
        ));
        assert!(matches!(
            Source::new("ftp://example.com/file", 5),
            Err(SourceError::MalformedEndpoint { .. })
        ));
    }

    #[test]
    fn validate_catches_hand_built_zero_interval() {
        let source = Source {
            endpoint: Url::parse("https://example.com").unwrap(),
            interval: Duration::ZERO,
        };
        assert!(source.validate().is_err());
    }

    #[test]
    fn rejects_intervals_beyond_one_year() {
        let err = Source::new("https://example.com", i64::MAX).unwrap_err();
        assert!(matches!(err, SourceError::IntervalTooLarge { .. }), "{:?}", err);

        let longest = Source::new("https://example.com", MAX_INTERVAL_SECS as i64).unwrap();
        assert_eq!(longest.interval, Duration::from_secs(MAX_INTERVAL_SECS));

        let hand_built = Source {
            endpoint: Url::parse("https://example.com").unwrap(),
            interval: Duration::MAX,
        };
        assert!(matches!(
            hand_built.validate(),
            Err(SourceError::IntervalTooLarge { .. })
        ));
    }

    #[test]
    fn registry_keeps_duplicates_in_order() {
        let mut registry = SourceRegistry::new();
        registry.add("https://a.example.com", 5).unwrap();
        registry.add("https://a.example.com", 5).unwrap();
        registry.add("https://b.example.com", 60).unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.sources()[0], registry.sources()[1]);
        assert_eq!(registry.sources()[2].interval, Duration::from_secs(60));
    }

    #[test]
    fn registry_add_leaves_list_untouched_on_error() {
        let mut registry = SourceRegistry::new();
        assert!(registry.add("https://a.example.com", 0).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn load_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        let registry = SourceRegistry::load(&path).unwrap();
        assert!(registry.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }

    #[test]
    fn save_then_load_preserves_url_and_frequency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        let mut registry = SourceRegistry::new();
        registry.add("https://example.com/health", 30).unwrap();
        registry.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["url"], "https://example.com/health");
        assert_eq!(raw[0]["frequency"], 30);

        let loaded = SourceRegistry::load(&path).unwrap();
        assert_eq!(loaded.sources(), registry.sources());
    }

    #[test]
    fn load_reports_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        std::fs::write(&path, "[{").unwrap();
        assert!(matches!(
            SourceRegistry::load(&path),
            Err(RegistryError::Parse { .. })
        ));
    }

    #[test]
    fn load_rejects_invalid_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        std::fs::write(&path, r#"[{"url": "https://example.com", "frequency": 0}]"#).unwrap();
        assert!(matches!(
            SourceRegistry::load(&path),
            Err(RegistryError::InvalidSource(_))
        ));
    }

    #[test]
    fn load_rejects_huge_frequency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sources.json");
        std::fs::write(
            &path,
            r#"[{"url": "https://example.com", "frequency": 9223372036854775807}]"#,
        )
        .unwrap();
        assert!(matches!(
            SourceRegistry::load(&path),
            Err(RegistryError::InvalidSource(SourceError::IntervalTooLarge { .. }))
        ));
    }
}
