//! Highlighting configuration.
//!
//! Defaults are overridden by settings stored in the config database, which
//! the command line can override again per request.

use crate::{
    config_db::ConfigDb,
    error::{Error, Result},
};

pub const FIELDS_KEY: &str = "highlight.fields";
pub const MAX_BRANCHES_KEY: &str = "highlight.max_branches";
pub const MAX_SLOP_KEY: &str = "highlight.max_slop";

/// Every settings key folio understands.
pub const KNOWN_KEYS: &[&str] = &[FIELDS_KEY, MAX_BRANCHES_KEY, MAX_SLOP_KEY];

pub const DEFAULT_MAX_BRANCHES: usize = 64;
pub const DEFAULT_MAX_SLOP: u32 = 16;

/// Limits and defaults for one highlight request.
///
/// # Examples
///
/// ```
/// use folio::config::HighlightConfig;
///
/// let config = HighlightConfig::default();
/// assert_eq!(config.fields, vec!["text".to_string()]);
/// assert_eq!(config.max_branches, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HighlightConfig {
    /// Fields highlighted when the request names none.
    pub fields: Vec<String>,
    /// Ceiling on open neighbor lists while matching one phrase.
    pub max_branches: usize,
    /// Phrase slop above this is clamped.
    pub max_slop: u32,
}

impl Default for HighlightConfig {
    fn default() -> Self {
        Self {
            fields: vec![crate::index::fields::TEXT.to_string()],
            max_branches: DEFAULT_MAX_BRANCHES,
            max_slop: DEFAULT_MAX_SLOP,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        Error::Config(format!("{key} must be a non-negative integer: {value}"))
    })
}

fn parse_fields(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

impl HighlightConfig {
    /// Defaults overridden by whatever the settings table holds.
    pub fn from_config_db(config_db: &ConfigDb) -> Result<Self> {
        let mut config = Self::default();
        if let Some(fields) = config_db.get_setting(FIELDS_KEY)? {
            let fields = parse_fields(&fields);
            if !fields.is_empty() {
                config.fields = fields;
            }
        }
        if let Some(value) = config_db.get_setting(MAX_BRANCHES_KEY)? {
            config.max_branches = parse_number(MAX_BRANCHES_KEY, &value)?;
        }
        if let Some(value) = config_db.get_setting(MAX_SLOP_KEY)? {
            config.max_slop = parse_number(MAX_SLOP_KEY, &value)?;
        }
        tracing::debug!(?config, "resolved highlight config");
        Ok(config)
    }
}

/// Check a value before it is written to the settings table.
pub fn validate_setting(key: &str, value: &str) -> Result<()> {
    match key {
        FIELDS_KEY => {
            let fields = parse_fields(value);
            if let Some(bad) = fields.iter().find(|f| {
                !crate::index::fields::HIGHLIGHTABLE.contains(&f.as_str())
            }) {
                return Err(Error::Config(format!(
                    "{key}: {bad} is not a highlightable field"
                )));
            }
            Ok(())
        }
        MAX_BRANCHES_KEY => parse_number::<usize>(key, value).map(|_| ()),
        MAX_SLOP_KEY => parse_number::<u32>(key, value).map(|_| ()),
        _ => Err(Error::Config(format!(
            "unknown setting {key} (known: {})",
            KNOWN_KEYS.join(", ")
        ))),
    }
}
