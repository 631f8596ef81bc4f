//! Runtime-wide reference defaults and forced overrides.

use serde::{Deserialize, Serialize};
use wayfarer_core::Properties;

use crate::{EncodingVersion, EndpointSelection};

/// Defaults applied to new references and overrides forced on every
/// resolution.
///
/// Read from properties with [`DefaultsAndOverrides::from_properties`]; bad
/// values log a warning and keep the default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultsAndOverrides {
    /// `Default.EndpointSelection`.
    pub endpoint_selection: EndpointSelection,
    /// `Default.PreferSecure`.
    pub prefer_secure: bool,
    /// `Default.LocatorCacheTimeout`, in seconds.
    pub locator_cache_timeout: i32,
    /// `Default.CollocationOptimized`.
    pub collocation_optimized: bool,
    /// `Default.InvocationTimeout`, in milliseconds.
    pub invocation_timeout: i32,
    /// `Default.EncodingVersion`.
    pub encoding: EncodingVersion,
    /// `Override.Timeout`, forced on every endpoint.
    pub override_timeout: Option<i32>,
    /// `Override.Compress`, forced on every endpoint.
    pub override_compress: Option<bool>,
    /// `Override.Secure`, forced on every reference.
    pub override_secure: Option<bool>,
}

impl Default for DefaultsAndOverrides {
    fn default() -> Self {
        Self {
            endpoint_selection: EndpointSelection::Random,
            prefer_secure: false,
            locator_cache_timeout: -1,
            collocation_optimized: true,
            invocation_timeout: -1,
            encoding: EncodingVersion::V1_1,
            override_timeout: None,
            override_compress: None,
            override_secure: None,
        }
    }
}

impl DefaultsAndOverrides {
    /// Read the `Default.*` and `Override.*` keys.
    pub fn from_properties(properties: &Properties) -> Self {
        let defaults = Self::default();

        let endpoint_selection = match properties.get("Default.EndpointSelection") {
            None => defaults.endpoint_selection,
            Some(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(
                    property = "Default.EndpointSelection",
                    error = %e,
                    "invalid endpoint selection, using Random"
                );
                defaults.endpoint_selection
            }),
        };

        let locator_cache_timeout = match properties.get_int("Default.LocatorCacheTimeout") {
            Some(timeout) if timeout < -1 => {
                tracing::warn!(
                    property = "Default.LocatorCacheTimeout",
                    value = timeout,
                    "invalid locator cache timeout, using -1"
                );
                defaults.locator_cache_timeout
            }
            Some(timeout) => timeout,
            None => defaults.locator_cache_timeout,
        };

        let invocation_timeout = match properties.get_int("Default.InvocationTimeout") {
            Some(timeout) if timeout < 1 && timeout != -1 => {
                tracing::warn!(
                    property = "Default.InvocationTimeout",
                    value = timeout,
                    "invalid invocation timeout, using -1"
                );
                defaults.invocation_timeout
            }
            Some(timeout) => timeout,
            None => defaults.invocation_timeout,
        };

        let encoding = match properties.get("Default.EncodingVersion") {
            None => defaults.encoding,
            Some(raw) => match raw.parse::<EncodingVersion>() {
                Ok(version) if version.is_supported() => version,
                Ok(version) => {
                    tracing::warn!(
                        property = "Default.EncodingVersion",
                        %version,
                        "unsupported encoding version, using 1.1"
                    );
                    defaults.encoding
                }
                Err(e) => {
                    tracing::warn!(
                        property = "Default.EncodingVersion",
                        error = %e,
                        "invalid encoding version, using 1.1"
                    );
                    defaults.encoding
                }
            },
        };

        let override_timeout = match properties.get_int("Override.Timeout") {
            Some(timeout) if timeout < 1 && timeout != -1 => {
                tracing::warn!(
                    property = "Override.Timeout",
                    value = timeout,
                    "invalid override timeout, using -1"
                );
                Some(-1)
            }
            other => other,
        };

        Self {
            endpoint_selection,
            prefer_secure: properties.get_int_with_default("Default.PreferSecure", 0) > 0,
            locator_cache_timeout,
            collocation_optimized: properties.get_int_with_default("Default.CollocationOptimized", 1)
                > 0,
            invocation_timeout,
            encoding,
            override_timeout,
            override_compress: properties.get_int("Override.Compress").map(|v| v > 0),
            override_secure: properties.get_int("Override.Secure").map(|v| v > 0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_properties_give_defaults() {
        let defaults = DefaultsAndOverrides::from_properties(&Properties::new());
        assert_eq!(defaults, DefaultsAndOverrides::default());
    }

    #[test]
    fn test_all_keys_are_read() {
        let props = Properties::from_iter([
            ("Default.EndpointSelection", "Ordered"),
            ("Default.PreferSecure", "1"),
            ("Default.LocatorCacheTimeout", "30"),
            ("Default.CollocationOptimized", "0"),
            ("Default.InvocationTimeout", "2500"),
            ("Default.EncodingVersion", "1.0"),
            ("Override.Timeout", "1500"),
            ("Override.Compress", "1"),
            ("Override.Secure", "0"),
        ]);
        let defaults = DefaultsAndOverrides::from_properties(&props);
        assert_eq!(defaults.endpoint_selection, EndpointSelection::Ordered);
        assert!(defaults.prefer_secure);
        assert_eq!(defaults.locator_cache_timeout, 30);
        assert!(!defaults.collocation_optimized);
        assert_eq!(defaults.invocation_timeout, 2500);
        assert_eq!(defaults.encoding, EncodingVersion::V1_0);
        assert_eq!(defaults.override_timeout, Some(1500));
        assert_eq!(defaults.override_compress, Some(true));
        assert_eq!(defaults.override_secure, Some(false));
    }

    #[test]
    fn test_bad_values_fall_back() {
        let props = Properties::from_iter([
            ("Default.EndpointSelection", "Sometimes"),
            ("Default.LocatorCacheTimeout", "-7"),
            ("Default.InvocationTimeout", "0"),
            ("Default.EncodingVersion", "3.0"),
            ("Override.Timeout", "-20"),
        ]);
        let defaults = DefaultsAndOverrides::from_properties(&props);
        assert_eq!(defaults.endpoint_selection, EndpointSelection::Random);
        assert_eq!(defaults.locator_cache_timeout, -1);
        assert_eq!(defaults.invocation_timeout, -1);
        assert_eq!(defaults.encoding, EncodingVersion::V1_1);
        assert_eq!(defaults.override_timeout, Some(-1));
    }

    #[test]
    fn test_deserializes_from_json() {
        let json = r#"{
            "endpoint_selection": "Ordered",
            "prefer_secure": true,
            "locator_cache_timeout": 0,
            "collocation_optimized": false,
            "invocation_timeout": -1,
            "encoding": { "major": 1, "minor": 0 },
            "override_timeout": null,
            "override_compress": true,
            "override_secure": null
        }"#;
        let defaults: DefaultsAndOverrides = serde_json::from_str(json).expect("valid json");
        assert_eq!(defaults.endpoint_selection, EndpointSelection::Ordered);
        assert_eq!(defaults.locator_cache_timeout, 0);
        assert_eq!(defaults.override_compress, Some(true));
    }
}
