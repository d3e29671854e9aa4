//! Credential handling for platform access.
//!
//! The security key and the issued access token never appear in
//! `Debug` or `Display` output. Call [`ApiCredential::expose`] only at
//! the point where the value goes on the wire.

use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Runtime configuration file
    Config,
    /// Environment variable
    Environment,
    /// Issued by the platform (access tokens)
    Issued,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Issued => write!(f, "platform"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A secret string with its origin.
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Take the configured value, falling back to an environment variable.
    ///
    /// Blank values count as unset.
    pub fn resolve(
        configured: Option<String>,
        env_value: Option<String>,
        name: &'static str,
    ) -> Option<Self> {
        let non_blank = |v: &String| !v.trim().is_empty();
        configured
            .filter(non_blank)
            .map(|v| Self::new(v, CredentialSource::Config, name))
            .or_else(|| {
                env_value
                    .filter(non_blank)
                    .map(|v| Self::new(v, CredentialSource::Environment, name))
            })
    }

    /// Expose the value for use in a request.
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Clone for ApiCredential {
    fn clone(&self) -> Self {
        Self::new(self.expose(), self.source, self.name)
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}
