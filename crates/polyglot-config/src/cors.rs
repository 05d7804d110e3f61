use std::time::Duration;

use serde::Deserialize;

/// CORS configuration for browser clients
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorsConfig {
    /// Allowed origins
    #[serde(default)]
    pub origins: AnyOrArray,
    /// Allowed methods
    #[serde(default)]
    pub methods: AnyOrArray,
    /// Allowed request headers
    #[serde(default)]
    pub headers: AnyOrArray,
    /// Allow credentials
    #[serde(default)]
    pub credentials: bool,
    /// Preflight cache lifetime in seconds
    #[serde(default)]
    pub max_age: Option<u64>,
}

impl CorsConfig {
    /// Preflight cache lifetime
    pub fn max_age_duration(&self) -> Option<Duration> {
        self.max_age.map(Duration::from_secs)
    }
}

/// Either the wildcard `"*"` or an explicit list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AnyOrArray {
    /// Match anything
    #[default]
    Any,
    /// Match only these values
    List(Vec<String>),
}

impl<'de> Deserialize<'de> for AnyOrArray {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        let values = match Raw::deserialize(deserializer)? {
            Raw::One(value) => vec![value],
            Raw::Many(values) => values,
        };

        if values.iter().any(|v| v == "*") {
            Ok(Self::Any)
        } else {
            Ok(Self::List(values))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wildcard_anywhere_means_any() {
        let config: CorsConfig = toml::from_str(r#"origins = ["https://a.dev", "*"]"#).unwrap();
        assert_eq!(config.origins, AnyOrArray::Any);
    }

    #[test]
    fn single_string_becomes_list() {
        let config: CorsConfig = toml::from_str(r#"origins = "https://a.dev""#).unwrap();
        assert_eq!(config.origins, AnyOrArray::List(vec!["https://a.dev".to_string()]));
        assert_eq!(config.methods, AnyOrArray::Any);
    }
}
