use parking_lot::RwLock;
use std::fmt;

/// Identity encoded into the connection handshake.
///
/// The token is never logged; `Debug` redacts it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub user_id: String,
    pub organization_id: Option<String>,
    pub workspace_id: Option<String>,
}

impl Credentials {
    pub fn new(token: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
            organization_id: None,
            workspace_id: None,
        }
    }

    pub fn with_organization_id(mut self, organization_id: impl Into<String>) -> Self {
        self.organization_id = Some(organization_id.into());
        self
    }

    pub fn with_workspace_id(mut self, workspace_id: impl Into<String>) -> Self {
        self.workspace_id = Some(workspace_id.into());
        self
    }

    /// A blank token or user id is treated the same as no credentials.
    pub fn is_usable(&self) -> bool {
        !self.token.trim().is_empty() && !self.user_id.trim().is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("organization_id", &self.organization_id)
            .field("workspace_id", &self.workspace_id)
            .finish()
    }
}

/// Source of the current identity.
///
/// Consulted on every connection attempt, so a provider backed by an auth
/// service hands out a refreshed token on reconnect. Refreshing is the
/// provider's job; the client only refuses to connect without one.
pub trait CredentialProvider: Send + Sync {
    fn credentials(&self) -> Option<Credentials>;
}

/// Provider holding credentials set by the application.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    credentials: RwLock<Option<Credentials>>,
}

impl StaticCredentials {
    pub fn new(credentials: Option<Credentials>) -> Self {
        Self {
            credentials: RwLock::new(credentials),
        }
    }

    /// Replace the stored credentials, e.g. after the application refreshed
    /// its access token. Takes effect on the next connection attempt.
    pub fn set(&self, credentials: Option<Credentials>) {
        *self.credentials.write() = credentials;
    }
}

impl CredentialProvider for StaticCredentials {
    fn credentials(&self) -> Option<Credentials> {
        self.credentials.read().clone()
    }
}

/// The credentials to use right now, if any are usable.
pub(crate) fn resolve(provider: &dyn CredentialProvider) -> Option<Credentials> {
    provider.credentials().filter(Credentials::is_usable)
}
