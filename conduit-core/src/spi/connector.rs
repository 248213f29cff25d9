use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{
    AuthenticationManager, AuthorizationManager, ConfigMap, Locale, Result,
    TraversalManager,
};

/// Response returned by configuration validation and form rendering.
///
/// Validation outcomes are classified by which fields are present:
/// - a `message` or `form_snippet` means the configuration was rejected and
///   the form should be redisplayed,
/// - only `config_data` means the configuration was accepted with the
///   supplied replacement values,
/// - an empty response means the configuration was accepted as is.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigureResponse {
    pub message: Option<String>,
    pub form_snippet: Option<String>,
    pub config_data: Option<ConfigMap>,
}

impl ConfigureResponse {
    pub fn rejected(
        message: impl Into<String>,
        form_snippet: Option<String>,
    ) -> Self {
        Self {
            message: Some(message.into()),
            form_snippet,
            config_data: None,
        }
    }

    pub fn form(form_snippet: impl Into<String>) -> Self {
        Self {
            message: None,
            form_snippet: Some(form_snippet.into()),
            config_data: None,
        }
    }

    pub fn substitute(config_data: ConfigMap) -> Self {
        Self {
            message: None,
            form_snippet: None,
            config_data: Some(config_data),
        }
    }

    /// True when the caller must redisplay the form instead of adopting the
    /// configuration.
    pub fn is_rejection(&self) -> bool {
        self.message.is_some() || self.form_snippet.is_some()
    }
}

/// Optional lifecycle capability of a connector.
#[async_trait]
pub trait ShutdownAware: Send + Sync {
    /// Release resources. The connector may be revived later from its
    /// persisted configuration.
    async fn shutdown(&self) -> Result<()>;

    /// Called after `shutdown` when the connector instance is being removed
    /// for good.
    async fn delete(&self) -> Result<()>;
}

/// A live connector instance built from a validated configuration.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn login(&self) -> Result<Arc<dyn Session>>;

    /// Connectors that hold external resources expose them here. The default
    /// makes shutdown and delete notifications no-ops.
    fn shutdown_aware(&self) -> Option<&dyn ShutdownAware> {
        None
    }
}

/// Capabilities granted by a successful login.
pub trait Session: Send + Sync {
    fn authentication_manager(&self) -> Option<Arc<dyn AuthenticationManager>>;

    fn authorization_manager(&self) -> Option<Arc<dyn AuthorizationManager>>;

    fn traversal_manager(&self) -> Result<Arc<dyn TraversalManager>>;
}

/// Lets a [`ConnectorType`] build trial connectors while validating.
#[async_trait]
pub trait ConnectorFactory: Send + Sync {
    /// Build a connector from `config`, or from the configuration under
    /// validation when `None`.
    async fn make_connector(
        &self,
        config: Option<&ConfigMap>,
    ) -> Result<Arc<dyn Connector>>;
}

/// Type-level metadata and construction for one kind of connector.
#[async_trait]
pub trait ConnectorType: Send + Sync {
    /// Validate a proposed configuration. `None` and an empty response both
    /// mean the configuration is acceptable as is.
    async fn validate_config(
        &self,
        config: &ConfigMap,
        locale: &Locale,
        factory: &dyn ConnectorFactory,
    ) -> Result<Option<ConfigureResponse>>;

    /// Render the configuration form populated with `config`.
    async fn populated_config_form(
        &self,
        config: &ConfigMap,
        locale: &Locale,
    ) -> Result<ConfigureResponse>;

    /// Build a live connector. Only called with configurations that passed
    /// validation.
    async fn instantiate(
        &self,
        config: &ConfigMap,
    ) -> Result<Arc<dyn Connector>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_requires_message_or_snippet() {
        assert!(ConfigureResponse::rejected("bad", None).is_rejection());
        assert!(ConfigureResponse::form("<tr/>").is_rejection());

        let mut data = ConfigMap::new();
        data.insert("k".into(), "v".into());
        assert!(!ConfigureResponse::substitute(data).is_rejection());
        assert!(!ConfigureResponse::default().is_rejection());
    }
}
