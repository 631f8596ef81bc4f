//! In-memory configuration properties.
//!
//! Properties are flat `key → value` strings such as
//! `ACM.Client.Timeout = 30`. How they are loaded (files, environment,
//! command line) is up to the application; this type only stores them and
//! offers typed accessors that fall back to a default on bad input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Flat string key/value configuration.
///
/// # Example
///
/// ```
/// use wayfarer_core::Properties;
///
/// let props = Properties::from_iter([("ACM.Client.Timeout", "30")]);
/// assert_eq!(props.get_int_with_default("ACM.Client.Timeout", 60), 30);
/// assert_eq!(props.get_int_with_default("ACM.Server.Timeout", 60), 60);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Properties {
    values: BTreeMap<String, String>,
}

impl Properties {
    /// Create an empty property set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    /// Builder-style variant of [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Raw value of `key`, if set and non-empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Value of `key`, or `default` when unset.
    pub fn get_with_default<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Integer value of `key`.
    ///
    /// Returns `default` when the key is unset. A value that is not an
    /// integer logs a warning and also yields `default`.
    pub fn get_int_with_default(&self, key: &str, default: i32) -> i32 {
        match self.get(key) {
            None => default,
            Some(raw) => match raw.trim().parse::<i32>() {
                Ok(value) => value,
                Err(_) => {
                    tracing::warn!(
                        property = key,
                        value = raw,
                        default,
                        "property is not an integer, using default"
                    );
                    default
                }
            },
        }
    }

    /// Integer value of `key`, or `None` when unset or malformed.
    pub fn get_int(&self, key: &str) -> Option<i32> {
        let raw = self.get(key)?;
        match raw.trim().parse::<i32>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(property = key, value = raw, "property is not an integer");
                None
            }
        }
    }

    /// Number of properties set.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no property is set.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for Properties
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_value_counts_as_unset() {
        let props = Properties::new().with("Default.EndpointSelection", "");
        assert_eq!(props.get("Default.EndpointSelection"), None);
        assert_eq!(
            props.get_with_default("Default.EndpointSelection", "Random"),
            "Random"
        );
    }

    #[test]
    fn test_malformed_integer_falls_back() {
        let props = Properties::from_iter([("ACM.Client.Close", "often")]);
        assert_eq!(props.get_int_with_default("ACM.Client.Close", 2), 2);
    }

    #[test]
    fn test_integer_is_trimmed() {
        let props = Properties::from_iter([("Override.Timeout", " 1500 ")]);
        assert_eq!(props.get_int("Override.Timeout"), Some(1500));
        assert_eq!(props.get_int("Override.Compress"), None);
    }

    #[test]
    fn test_set_replaces_value() {
        let mut props = Properties::new();
        props.set("Default.PreferSecure", "0");
        props.set("Default.PreferSecure", "1");
        assert_eq!(props.len(), 1);
        assert_eq!(props.get_int_with_default("Default.PreferSecure", 0), 1);
    }
}
