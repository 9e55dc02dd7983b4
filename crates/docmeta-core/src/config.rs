use std::collections::{BTreeMap, HashSet};
use std::num::NonZeroU64;

use thiserror::Error;

/// Placeholder the workflow layer writes into slots it has no value for.
/// Treated exactly like an absent key.
pub const UNDEFINED_VALUE: &str = "$UNDEFINED$";

pub const OUTPUT_META: &str = "output.meta";
pub const OUTPUT_FAULT: &str = "output.fault";
pub const EXCLUDED_IDS: &str = "excluded.ids";
pub const MAX_FILE_SIZE_MB: &str = "import.content.max.file.size.mb";
pub const PROCESSING_TIME_THRESHOLD_SECS: &str = "log.fault.processing.time.threshold.secs";
pub const ANALYSIS_EXCEPTION_CRITICAL: &str = "analysis.exception.critical";
pub const OTHER_EXCEPTION_CRITICAL: &str = "other.exception.critical";
pub const PROGRESS_LOG_INTERVAL: &str = "progress.log.interval";

pub const DEFAULT_PROGRESS_LOG_INTERVAL: NonZeroU64 = NonZeroU64::new(100).unwrap();

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("no named output provided for {0}")]
    MissingOutput(&'static str),
    #[error("invalid integer for `{key}`: {value:?}")]
    InvalidNumber { key: &'static str, value: String },
    #[error("invalid boolean for `{key}`: {value:?}")]
    InvalidBool { key: &'static str, value: String },
    #[error("`{0}` must be greater than zero")]
    NotPositive(&'static str),
    #[error("failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unsupported TOML value for `{0}`")]
    UnsupportedToml(String),
}

/// Flat string-keyed configuration handed to a stage by the scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigBag {
    entries: BTreeMap<String, String>,
}

impl ConfigBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Raw value for `key`, unless it is absent, blank, or [`UNDEFINED_VALUE`].
    pub fn defined(&self, key: &str) -> Option<&str> {
        self.get(key)
            .filter(|v| !v.trim().is_empty() && *v != UNDEFINED_VALUE)
    }

    /// Overlay `other` on top of `self`; keys present in both take `other`'s value.
    pub fn merge(&mut self, other: ConfigBag) {
        self.entries.extend(other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a TOML document into a flat bag.
    ///
    /// Nested tables are joined with `.`, so `[output] meta = "m"` and
    /// `"output.meta" = "m"` are equivalent. Scalars are stringified; arrays
    /// of scalars are joined with `,` (handy for `excluded.ids`).
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = toml::from_str(content)?;
        let mut bag = ConfigBag::new();
        flatten_table("", &table, &mut bag)?;
        Ok(bag)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConfigBag {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

fn flatten_table(prefix: &str, table: &toml::Table, bag: &mut ConfigBag) -> Result<(), ConfigError> {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(inner) => flatten_table(&full_key, inner, bag)?,
            toml::Value::Array(items) => {
                let parts = items
                    .iter()
                    .map(scalar_to_string)
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| ConfigError::UnsupportedToml(full_key.clone()))?;
                bag.set(full_key, parts.join(","));
            }
            scalar => {
                let value = scalar_to_string(scalar)
                    .ok_or_else(|| ConfigError::UnsupportedToml(full_key.clone()))?;
                bag.set(full_key, value);
            }
        }
    }
    Ok(())
}

fn scalar_to_string(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Resolved, immutable stage configuration. Built once per worker and shared
/// read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageConfig {
    named_output_meta: String,
    named_output_fault: String,
    excluded_ids: HashSet<String>,
    /// `None` means unbounded.
    max_file_size_kb: Option<u64>,
    /// `None` means unbounded.
    processing_time_threshold_ms: Option<u64>,
    analysis_exception_critical: bool,
    other_exception_critical: bool,
    progress_log_interval: NonZeroU64,
}

impl StageConfig {
    pub fn new(named_output_meta: impl Into<String>, named_output_fault: impl Into<String>) -> Self {
        Self {
            named_output_meta: named_output_meta.into(),
            named_output_fault: named_output_fault.into(),
            excluded_ids: HashSet::new(),
            max_file_size_kb: None,
            processing_time_threshold_ms: None,
            analysis_exception_critical: false,
            other_exception_critical: false,
            progress_log_interval: DEFAULT_PROGRESS_LOG_INTERVAL,
        }
    }

    /// Resolve a configuration bag.
    ///
    /// Both output names are required. Every optional key treats a missing
    /// value, a blank value and [`UNDEFINED_VALUE`] the same way: the default
    /// applies.
    pub fn from_bag(bag: &ConfigBag) -> Result<Self, ConfigError> {
        let named_output_meta = bag
            .defined(OUTPUT_META)
            .ok_or(ConfigError::MissingOutput("metadata"))?;
        let named_output_fault = bag
            .defined(OUTPUT_FAULT)
            .ok_or(ConfigError::MissingOutput("fault"))?;

        let excluded_ids = match bag.defined(EXCLUDED_IDS) {
            Some(csv) => {
                tracing::warn!(excluded_ids = csv, "got excluded ids");
                parse_excluded_ids(csv)
            }
            None => {
                tracing::warn!("got no excluded ids");
                HashSet::new()
            }
        };

        let progress_log_interval = match parse_u64(bag, PROGRESS_LOG_INTERVAL)? {
            Some(n) => NonZeroU64::new(n).ok_or(ConfigError::NotPositive(PROGRESS_LOG_INTERVAL))?,
            None => DEFAULT_PROGRESS_LOG_INTERVAL,
        };

        Ok(Self {
            named_output_meta: named_output_meta.to_string(),
            named_output_fault: named_output_fault.to_string(),
            excluded_ids,
            max_file_size_kb: parse_u64(bag, MAX_FILE_SIZE_MB)?.map(|mb| mb * 1024),
            processing_time_threshold_ms: parse_u64(bag, PROCESSING_TIME_THRESHOLD_SECS)?
                .map(|secs| secs * 1000),
            analysis_exception_critical: parse_bool(bag, ANALYSIS_EXCEPTION_CRITICAL)?
                .unwrap_or(false),
            other_exception_critical: parse_bool(bag, OTHER_EXCEPTION_CRITICAL)?.unwrap_or(false),
            progress_log_interval,
        })
    }

    pub fn with_excluded_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_max_file_size_kb(mut self, kb: u64) -> Self {
        self.max_file_size_kb = Some(kb);
        self
    }

    pub fn with_processing_time_threshold_ms(mut self, ms: u64) -> Self {
        self.processing_time_threshold_ms = Some(ms);
        self
    }

    pub fn with_analysis_exception_critical(mut self, critical: bool) -> Self {
        self.analysis_exception_critical = critical;
        self
    }

    pub fn with_other_exception_critical(mut self, critical: bool) -> Self {
        self.other_exception_critical = critical;
        self
    }

    pub fn with_progress_log_interval(mut self, interval: NonZeroU64) -> Self {
        self.progress_log_interval = interval;
        self
    }

    pub fn named_output_meta(&self) -> &str {
        &self.named_output_meta
    }

    pub fn named_output_fault(&self) -> &str {
        &self.named_output_fault
    }

    pub fn excluded_ids(&self) -> &HashSet<String> {
        &self.excluded_ids
    }

    pub fn max_file_size_kb(&self) -> Option<u64> {
        self.max_file_size_kb
    }

    pub fn processing_time_threshold_ms(&self) -> Option<u64> {
        self.processing_time_threshold_ms
    }

    pub fn analysis_exception_critical(&self) -> bool {
        self.analysis_exception_critical
    }

    pub fn other_exception_critical(&self) -> bool {
        self.other_exception_critical
    }

    pub fn progress_log_interval(&self) -> NonZeroU64 {
        self.progress_log_interval
    }

    pub fn is_excluded(&self, document_id: &str) -> bool {
        self.excluded_ids.contains(document_id)
    }

    pub fn exceeds_max_file_size(&self, content_length_kb: u64) -> bool {
        self.max_file_size_kb
            .is_some_and(|limit| content_length_kb > limit)
    }
}

/// Split the excluded-ids CSV.
///
/// The whole value is trimmed, then split on `,`. Empty tokens are dropped
/// (adjacent separators count as one), so the empty id can never be excluded.
/// Individual tokens keep their surrounding whitespace.
pub fn parse_excluded_ids(csv: &str) -> HashSet<String> {
    csv.trim()
        .split(',')
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u64(bag: &ConfigBag, key: &'static str) -> Result<Option<u64>, ConfigError> {
    bag.defined(key)
        .map(|raw| {
            raw.trim()
                .parse::<u32>()
                .map(u64::from)
                .map_err(|_| ConfigError::InvalidNumber {
                    key,
                    value: raw.to_string(),
                })
        })
        .transpose()
}

fn parse_bool(bag: &ConfigBag, key: &'static str) -> Result<Option<bool>, ConfigError> {
    bag.defined(key)
        .map(|raw| match raw.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ConfigError::InvalidBool {
                key,
                value: raw.to_string(),
            }),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bag(pairs: &[(&str, &str)]) -> ConfigBag {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![(OUTPUT_META, "meta"), (OUTPUT_FAULT, "fault")]
    }

    #[test]
    fn test_defaults() {
        let config = StageConfig::from_bag(&bag(&base())).unwrap();
        assert_eq!(config.named_output_meta(), "meta");
        assert_eq!(config.named_output_fault(), "fault");
        assert!(config.excluded_ids().is_empty());
        assert_eq!(config.max_file_size_kb(), None);
        assert_eq!(config.processing_time_threshold_ms(), None);
        assert!(!config.analysis_exception_critical());
        assert!(!config.other_exception_critical());
        assert_eq!(config.progress_log_interval().get(), 100);
    }

    #[test]
    fn test_missing_outputs_fail() {
        let err = StageConfig::from_bag(&bag(&[(OUTPUT_FAULT, "fault")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingOutput("metadata")));

        let err = StageConfig::from_bag(&bag(&[(OUTPUT_META, "meta"), (OUTPUT_FAULT, "")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingOutput("fault")));

        let err = StageConfig::from_bag(&bag(&[
            (OUTPUT_META, UNDEFINED_VALUE),
            (OUTPUT_FAULT, "fault"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingOutput("metadata")));
    }

    #[test]
    fn test_unit_conversions() {
        let mut pairs = base();
        pairs.push((MAX_FILE_SIZE_MB, "2"));
        pairs.push((PROCESSING_TIME_THRESHOLD_SECS, "3"));
        let config = StageConfig::from_bag(&bag(&pairs)).unwrap();
        assert_eq!(config.max_file_size_kb(), Some(2048));
        assert_eq!(config.processing_time_threshold_ms(), Some(3000));
    }

    #[test]
    fn test_numeric_sentinels_are_equivalent() {
        for key in [MAX_FILE_SIZE_MB, PROCESSING_TIME_THRESHOLD_SECS, PROGRESS_LOG_INTERVAL] {
            let absent = StageConfig::from_bag(&bag(&base())).unwrap();
            for raw in ["", "   ", UNDEFINED_VALUE] {
                let mut pairs = base();
                pairs.push((key, raw));
                let resolved = StageConfig::from_bag(&bag(&pairs)).unwrap();
                assert_eq!(resolved, absent, "key {key} with raw value {raw:?}");
            }
        }
    }

    #[test]
    fn test_invalid_numbers_fail() {
        // Negative limits are rejected instead of making every record oversized
        // or every record slow.
        for raw in ["ten", "-1", "1.5"] {
            let mut pairs = base();
            pairs.push((MAX_FILE_SIZE_MB, raw));
            let err = StageConfig::from_bag(&bag(&pairs)).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidNumber { key: MAX_FILE_SIZE_MB, .. }));
        }
    }

    #[test]
    fn test_negative_threshold_rejected() {
        let mut pairs = base();
        pairs.push((PROCESSING_TIME_THRESHOLD_SECS, "-5"));
        let err = StageConfig::from_bag(&bag(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidNumber {
                key: PROCESSING_TIME_THRESHOLD_SECS,
                ..
            }
        ));
    }

    #[test]
    fn test_zero_progress_interval_rejected() {
        let mut pairs = base();
        pairs.push((PROGRESS_LOG_INTERVAL, "0"));
        let err = StageConfig::from_bag(&bag(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::NotPositive(PROGRESS_LOG_INTERVAL)));
    }

    #[test]
    fn test_critical_flags() {
        let mut pairs = base();
        pairs.push((ANALYSIS_EXCEPTION_CRITICAL, "TRUE"));
        pairs.push((OTHER_EXCEPTION_CRITICAL, "false"));
        let config = StageConfig::from_bag(&bag(&pairs)).unwrap();
        assert!(config.analysis_exception_critical());
        assert!(!config.other_exception_critical());

        let mut pairs = base();
        pairs.push((OTHER_EXCEPTION_CRITICAL, "yes"));
        assert!(matches!(
            StageConfig::from_bag(&bag(&pairs)).unwrap_err(),
            ConfigError::InvalidBool { .. }
        ));
    }

    #[test]
    fn test_excluded_ids_split() {
        let ids = parse_excluded_ids(" doc1,doc2 ");
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("doc1"));
        assert!(ids.contains("doc2"));
    }

    #[test]
    fn test_excluded_ids_drop_empty_tokens() {
        let ids = parse_excluded_ids("a,,b,");
        assert_eq!(ids, HashSet::from(["a".to_string(), "b".to_string()]));
        assert!(!ids.contains(""));

        let config = StageConfig::from_bag(&bag(&[
            (OUTPUT_META, "meta"),
            (OUTPUT_FAULT, "fault"),
            (EXCLUDED_IDS, ",,"),
        ]))
        .unwrap();
        assert!(config.excluded_ids().is_empty());
        assert!(!config.is_excluded(""));
    }

    #[test]
    fn test_excluded_ids_keep_inner_whitespace() {
        let ids = parse_excluded_ids("a, b");
        assert!(ids.contains("a"));
        assert!(ids.contains(" b"));
        assert!(!ids.contains("b"));
    }

    #[test]
    fn test_exceeds_max_file_size() {
        let config = StageConfig::new("m", "f").with_max_file_size_kb(1024);
        assert!(!config.exceeds_max_file_size(1024));
        assert!(config.exceeds_max_file_size(1025));
        assert!(!StageConfig::new("m", "f").exceeds_max_file_size(u64::MAX));
    }

    #[test]
    fn test_toml_flattening() {
        let bag = ConfigBag::from_toml_str(
            r#"
            "excluded.ids" = ["a", "b"]

            [output]
            meta = "m"
            fault = "f"

            [import.content.max.file.size]
            mb = 5
            "#,
        )
        .unwrap();
        assert_eq!(bag.get(OUTPUT_META), Some("m"));
        assert_eq!(bag.get(OUTPUT_FAULT), Some("f"));
        assert_eq!(bag.get(EXCLUDED_IDS), Some("a,b"));
        assert_eq!(bag.get(MAX_FILE_SIZE_MB), Some("5"));

        let config = StageConfig::from_bag(&bag).unwrap();
        assert_eq!(config.max_file_size_kb(), Some(5 * 1024));
    }

    #[test]
    fn test_merge_overlay_wins() {
        let mut base = bag(&[(OUTPUT_META, "a"), (OUTPUT_FAULT, "f")]);
        base.merge(bag(&[(OUTPUT_META, "b")]));
        assert_eq!(base.get(OUTPUT_META), Some("b"));
        assert_eq!(base.get(OUTPUT_FAULT), Some("f"));
    }
}
