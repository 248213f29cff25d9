use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::Result;

/// Credentials and session cookies presented by an end user.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AuthenticationIdentity {
    pub username: String,
    pub password: Option<String>,
    pub domain: Option<String>,
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
}

impl AuthenticationIdentity {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationResponse {
    pub valid: bool,
    pub groups: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    pub docid: String,
    pub valid: bool,
}

#[async_trait]
pub trait AuthenticationManager: Send + Sync {
    async fn authenticate(
        &self,
        identity: &AuthenticationIdentity,
    ) -> Result<AuthenticationResponse>;
}

/// Answers whether a user may see documents previously fed by traversal.
#[async_trait]
pub trait AuthorizationManager: Send + Sync {
    /// Returns one response per docid; order is not significant. Callers
    /// never pass a docid twice.
    async fn authorize_docids(
        &self,
        docids: &[String],
        identity: &AuthenticationIdentity,
    ) -> Result<Vec<AuthorizationResponse>>;
}
