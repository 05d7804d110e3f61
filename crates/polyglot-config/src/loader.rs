use std::path::Path;

use crate::{AnyOrArray, Config, ProtocolAuth, ProtocolId};

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let expanded =
            crate::env::expand_env(&raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if no routes are configured, the path prefix is
    /// malformed, or a route lacks the credentials its target needs
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_path_prefix()?;
        self.validate_cors()?;
        self.validate_routes()?;
        Ok(())
    }

    fn validate_path_prefix(&self) -> anyhow::Result<()> {
        let prefix = &self.gateway.path_prefix;

        if !prefix.starts_with('/') || (prefix.len() > 1 && prefix.ends_with('/')) {
            anyhow::bail!("gateway.path_prefix must start with '/' and must not end with '/': `{prefix}`");
        }

        Ok(())
    }

    fn validate_cors(&self) -> anyhow::Result<()> {
        let Some(cors) = &self.server.cors else {
            return Ok(());
        };

        let wildcard = [&cors.origins, &cors.methods, &cors.headers]
            .iter()
            .any(|v| matches!(v, AnyOrArray::Any));
        if cors.credentials && wildcard {
            anyhow::bail!("server.cors.credentials requires explicit origins, methods and headers");
        }

        Ok(())
    }

    fn validate_routes(&self) -> anyhow::Result<()> {
        if self.gateway.routes.is_empty() {
            anyhow::bail!("at least one gateway route must be configured");
        }

        for (token, route) in &self.gateway.routes {
            if token.is_empty() || token.contains('/') {
                anyhow::bail!("gateway route token `{token}` must be non-empty and contain no '/'");
            }

            if route.version != 1 {
                anyhow::bail!("gateway route `{token}` has unsupported version {}", route.version);
            }

            if route.target_protocol == ProtocolId::Bedrock && !matches!(route.auth, ProtocolAuth::Aws(_)) {
                anyhow::bail!("gateway route `{token}` targets bedrock and requires `aws` auth");
            }

            if matches!(route.target_base_url.scheme(), "http" | "https") {
                continue;
            }

            anyhow::bail!(
                "gateway route `{token}` has unsupported base URL scheme `{}`",
                route.target_base_url.scheme()
            );
        }

        Ok(())
    }
}
