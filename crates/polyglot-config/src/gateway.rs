use std::time::Duration;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::protocol::ProxyConfig;

/// Gateway routing configuration
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Path prefix in front of `/{token}/...`
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    /// TCP connect timeout for upstream calls
    #[serde(default)]
    pub connect_timeout_seconds: Option<u64>,
    /// Routes keyed by their opaque client token
    #[serde(default)]
    pub routes: IndexMap<String, ProxyConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            path_prefix: default_path_prefix(),
            connect_timeout_seconds: None,
            routes: IndexMap::new(),
        }
    }
}

impl GatewayConfig {
    /// Connect timeout as a `Duration`
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_seconds.map(Duration::from_secs)
    }
}

fn default_path_prefix() -> String {
    "/proxy".to_string()
}
