//! Programmatic configuration builder for integration tests

use std::net::SocketAddr;

use polyglot_config::{Config, CorsConfig, HealthConfig, ProtocolAuth, ProtocolId, ProxyConfig, ServerConfig};
use secrecy::SecretString;

/// Builder for constructing test configurations
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with minimal defaults
    pub fn new() -> Self {
        Self {
            config: Config {
                server: ServerConfig {
                    listen_address: Some(SocketAddr::from(([127, 0, 0, 1], 0))),
                    health: HealthConfig {
                        enabled: true,
                        ..HealthConfig::default()
                    },
                    ..ServerConfig::default()
                },
                ..Config::default()
            },
        }
    }

    /// Add a route under `token`
    pub fn with_route(mut self, token: &str, route: ProxyConfig) -> Self {
        self.config.gateway.routes.insert(token.to_owned(), route);
        self
    }

    /// Set CORS configuration
    pub fn with_cors(mut self, config: CorsConfig) -> Self {
        self.config.server.cors = Some(config);
        self
    }

    /// Disable health endpoint
    pub fn without_health(mut self) -> Self {
        self.config.server.health.enabled = false;
        self
    }

    /// Build the final config
    pub fn build(self) -> Config {
        self.config
    }
}

/// Route from `source` (detected when `None`) to `target` at `base_url`
pub fn route(source: Option<ProtocolId>, target: ProtocolId, base_url: &str) -> ProxyConfig {
    let mut route = ProxyConfig::new(target, base_url.parse().expect("valid URL"));
    route.source_protocol = source;
    route
}

/// Bearer credentials
pub fn bearer(token: &str) -> ProtocolAuth {
    ProtocolAuth::Bearer {
        token: SecretString::from(token),
    }
}
