//! Principals, credential validation and the admission policy.
//!
//! Token parsing and issuance live outside the relay. The relay only sees
//! the [`Authenticator`] seam and decides admission with an
//! [`AdmissionPolicy`].

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Role granting full control of the hub.
pub const ROLE_ADMINISTRATOR: &str = "administrator";
/// Role granting read access to hub state.
pub const ROLE_USER_READ: &str = "userRead";

/// A validated caller identity and its role set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub subject: String,
    pub roles: BTreeSet<String>,
}

impl Principal {
    pub fn new<I, S>(subject: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subject: subject.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("malformed token: {0}")]
    Malformed(String),
    #[error("token expired")]
    Expired,
    #[error("unknown token")]
    Unknown,
    #[error("authentication backend unavailable: {0}")]
    Unavailable(String),
}

/// Converts a bearer token into a [`Principal`].
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError>;
}

/// Which principals may open a notification stream.
///
/// A principal is admitted when it carries at least one of the listed roles.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionPolicy {
    pub any_of: BTreeSet<String>,
}

impl AdmissionPolicy {
    pub fn any_of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            any_of: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn permits(&self, principal: &Principal) -> bool {
        principal.roles.iter().any(|r| self.any_of.contains(r))
    }
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self::any_of([ROLE_ADMINISTRATOR, ROLE_USER_READ])
    }
}

/// Authenticator backed by a fixed token table.
#[derive(Clone, Debug, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, Principal>,
}

impl StaticTokenAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        let _ = self.tokens.insert(token.into(), principal);
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl Authenticator for StaticTokenAuthenticator {
    async fn authenticate(&self, token: &str) -> Result<Principal, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Malformed("empty token".into()));
        }
        self.tokens.get(token).cloned().ok_or(AuthError::Unknown)
    }
}
