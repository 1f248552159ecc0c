//! Collection and dashboard configuration.
//!
//! A `CollectionConfig` is fixed at construction and shared behind `Arc` by
//! the provider that owns it. Binding to a different resource means building
//! a new config and a new provider.

use std::env;

use thiserror::Error;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://apex.oracle.com/pls/apex/oraclejet/lp/";
pub const DEFAULT_PAGE_SIZE: usize = 25;
pub const DEFAULT_KEY_FIELD: &str = "id";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid base URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("{var} must be a positive integer, got {value:?}")]
    InvalidPageSize { var: &'static str, value: String },
}

/// Immutable description of one remote collection endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionConfig {
    base_url: Url,
    key_field: String,
    filterable_fields: Vec<String>,
}

impl CollectionConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self::from_url(Url::parse(base_url)?))
    }

    /// Wrap `base_url`, normalising its path to end in `/` so record keys
    /// join onto it as `{base}{key}`.
    pub fn from_url(mut base_url: Url) -> Self {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self {
            base_url,
            key_field: DEFAULT_KEY_FIELD.to_string(),
            filterable_fields: Vec::new(),
        }
    }

    pub fn with_key_field(mut self, key_field: impl Into<String>) -> Self {
        self.key_field = key_field.into();
        self
    }

    pub fn with_filterable_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.filterable_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn key_field(&self) -> &str {
        &self.key_field
    }

    pub fn filterable_fields(&self) -> &[String] {
        &self.filterable_fields
    }
}

/// Settings for the dashboard as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DashboardConfig {
    /// Root of the REST service; activities live at `{base_url}activities/`.
    pub base_url: Url,
    pub page_size: usize,
    pub key_field: String,
    pub item_filter_fields: Vec<String>,
}

impl DashboardConfig {
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: CollectionConfig::new(base_url)?.base_url,
            page_size: DEFAULT_PAGE_SIZE,
            key_field: DEFAULT_KEY_FIELD.to_string(),
            item_filter_fields: vec!["name".to_string()],
        })
    }

    /// Load from `DASHBOARD_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load using `lookup` to resolve variable names, falling back to defaults
    /// for anything unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup("DASHBOARD_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let mut config = Self::new(&base_url)?;

        if let Some(raw) = lookup("DASHBOARD_PAGE_SIZE") {
            config.page_size = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| ConfigError::InvalidPageSize {
                    var: "DASHBOARD_PAGE_SIZE",
                    value: raw.clone(),
                })?;
        }

        if let Some(raw) = lookup("DASHBOARD_ITEM_FILTER_FIELDS") {
            config.item_filter_fields = raw
                .split(',')
                .map(str::trim)
                .filter(|field| !field.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() {
        let config = CollectionConfig::new("http://localhost:3000/activities").unwrap();
        assert_eq!(config.base_url().as_str(), "http://localhost:3000/activities/");
        assert_eq!(config.key_field(), "id");
        assert!(config.filterable_fields().is_empty());
    }

    #[test]
    fn invalid_base_url_is_rejected() {
        assert!(matches!(
            CollectionConfig::new("not a url"),
            Err(ConfigError::InvalidUrl(_))
        ));
    }

    #[test]
    fn lookup_defaults_when_unset() {
        let config = DashboardConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.base_url.as_str(), DEFAULT_BASE_URL);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(config.item_filter_fields, vec!["name".to_string()]);
    }

    #[test]
    fn lookup_reads_overrides() {
        let vars: HashMap<&str, &str> = [
            ("DASHBOARD_BASE_URL", "http://127.0.0.1:9000/api"),
            ("DASHBOARD_PAGE_SIZE", "10"),
            ("DASHBOARD_ITEM_FILTER_FIELDS", "name, short_desc"),
        ]
        .into_iter()
        .collect();
        let config = DashboardConfig::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.base_url.as_str(), "http://127.0.0.1:9000/api/");
        assert_eq!(config.page_size, 10);
        assert_eq!(config.item_filter_fields, vec!["name", "short_desc"]);
    }

    #[test]
    fn zero_page_size_is_rejected() {
        let err = DashboardConfig::from_lookup(|name| {
            (name == "DASHBOARD_PAGE_SIZE").then(|| "0".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPageSize { .. }));
    }
}
