//! Case-insensitive request parameters.

use std::collections::HashMap;
use std::str::FromStr;

use crate::error::ServiceError;

/// Query parameters with lower-cased keys.
///
/// Empty values count as absent, so `LAYERS=` is reported as missing.
#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    values: HashMap<String, String>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from decoded key/value pairs. Later duplicates win.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let values = pairs
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_lowercase(), v.into()))
            .collect();
        Self { values }
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_lowercase(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&key.to_lowercase())
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// First present value among `keys`, e.g. `srs` or its `crs` alias.
    pub fn get_any(&self, keys: &[&str]) -> Option<&str> {
        keys.iter().find_map(|k| self.get(k))
    }

    /// Value of `key`, or `MissingParameterValue` naming it.
    pub fn require(&self, key: &str) -> Result<&str, ServiceError> {
        self.get(key).ok_or_else(|| ServiceError::missing(key))
    }

    /// Parse a present value strictly; trailing garbage is invalid.
    pub fn parse<T: FromStr>(&self, key: &str) -> Result<T, ServiceError> {
        let raw = self.require(key)?;
        parse_strict(key, raw)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

pub(crate) fn parse_strict<T: FromStr>(key: &str, raw: &str) -> Result<T, ServiceError> {
    raw.trim()
        .parse()
        .map_err(|_| ServiceError::invalid(key, raw))
}
