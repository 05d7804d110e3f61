//! Route lookup by client token

use async_trait::async_trait;
use indexmap::IndexMap;
use polyglot_config::ProxyConfig;

use crate::error::LlmError;

/// Only route format this gateway serves
pub const SUPPORTED_VERSION: u32 = 1;

/// Resolves the opaque token in a proxy URL to its route
#[async_trait]
pub trait ConfigResolver: Send + Sync {
    /// Route for `token`
    ///
    /// Unknown tokens are [`LlmError::RouteNotFound`]; routes in another
    /// format version are [`LlmError::UnsupportedVersion`].
    async fn resolve(&self, token: &str) -> Result<ProxyConfig, LlmError>;
}

/// Routes declared in the configuration file
#[derive(Debug, Clone, Default)]
pub struct StaticRoutes {
    routes: IndexMap<String, ProxyConfig>,
}

impl StaticRoutes {
    pub const fn new(routes: IndexMap<String, ProxyConfig>) -> Self {
        Self { routes }
    }
}

#[async_trait]
impl ConfigResolver for StaticRoutes {
    async fn resolve(&self, token: &str) -> Result<ProxyConfig, LlmError> {
        let route = self.routes.get(token).ok_or(LlmError::RouteNotFound)?;
        if route.version != SUPPORTED_VERSION {
            return Err(LlmError::UnsupportedVersion { version: route.version });
        }
        Ok(route.clone())
    }
}

#[cfg(test)]
mod tests {
    use polyglot_config::ProtocolId;
    use url::Url;

    use super::*;

    fn routes() -> StaticRoutes {
        let current = ProxyConfig::new(ProtocolId::Openai, Url::parse("https://api.openai.com/v1").unwrap());
        let mut future = current.clone();
        future.version = 2;

        StaticRoutes::new(IndexMap::from([
            ("current".to_owned(), current),
            ("future".to_owned(), future),
        ]))
    }

    #[tokio::test]
    async fn resolves_known_tokens() {
        let route = routes().resolve("current").await.unwrap();
        assert_eq!(route.target_protocol, ProtocolId::Openai);
    }

    #[tokio::test]
    async fn unknown_token_is_route_not_found() {
        assert!(matches!(routes().resolve("nope").await, Err(LlmError::RouteNotFound)));
    }

    #[tokio::test]
    async fn other_versions_are_rejected() {
        assert!(matches!(
            routes().resolve("future").await,
            Err(LlmError::UnsupportedVersion { version: 2 })
        ));
    }
}
