use std::fmt::{Debug, Formatter};

use async_trait::async_trait;

use crate::time::{now, DateTime};
use crate::utils::Redact;
use crate::Result;

/// Credential that holds the access key pair and an optional STS token.
///
/// The signer treats a credential as a read-only snapshot: it clones the
/// value once at the start of signing and never re-reads provider state
/// mid-computation.
#[derive(Default, Clone)]
pub struct Credential {
    /// Access key id.
    pub access_key_id: String,
    /// Access key secret.
    pub access_key_secret: String,
    /// Security token issued by STS, if any.
    pub security_token: Option<String>,
    /// Expiration time for this credential, if any.
    pub expiration: Option<DateTime>,
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_key_id", &Redact::from(&self.access_key_id))
            .field("access_key_secret", &Redact::from(&self.access_key_secret))
            .field("security_token", &Redact::from(&self.security_token))
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl Credential {
    /// Create a new credential from an access key pair.
    pub fn new(access_key_id: &str, access_key_secret: &str) -> Self {
        Self {
            access_key_id: access_key_id.to_string(),
            access_key_secret: access_key_secret.to_string(),
            security_token: None,
            expiration: None,
        }
    }

    /// Set the security token.
    pub fn with_security_token(mut self, token: &str) -> Self {
        self.security_token = Some(token.to_string());
        self
    }

    /// Set the expiration time.
    pub fn with_expiration(mut self, expiration: DateTime) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Check whether both access key id and secret are present.
    pub fn has_keys(&self) -> bool {
        !self.access_key_id.is_empty() && !self.access_key_secret.is_empty()
    }

    /// Check whether the credential has passed its expiration time.
    ///
    /// A credential without an expiration never expires.
    pub fn is_expired(&self) -> bool {
        match self.expiration {
            Some(v) => v <= now(),
            None => false,
        }
    }
}

/// ProvideCredential is the contract consumed by the presign orchestrator
/// to obtain credentials.
///
/// Acquisition and rotation live behind this trait; the signer only ever
/// sees the returned snapshot.
#[async_trait]
pub trait ProvideCredential: Debug + Send + Sync + 'static {
    /// Provide a credential, or `None` when no credential is available.
    async fn provide_credential(&self) -> Result<Option<Credential>>;
}

/// StaticCredentialProvider returns a fixed credential.
///
/// This provider is used when the access key pair is known up front and no
/// dynamic loading is wanted.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credential: Credential,
}

impl StaticCredentialProvider {
    /// Create a new StaticCredentialProvider with an access key pair.
    pub fn new(access_key_id: &str, access_key_secret: &str) -> Self {
        Self {
            credential: Credential::new(access_key_id, access_key_secret),
        }
    }

    /// Set the security token.
    pub fn with_security_token(mut self, token: &str) -> Self {
        self.credential.security_token = Some(token.to_string());
        self
    }
}

#[async_trait]
impl ProvideCredential for StaticCredentialProvider {
    async fn provide_credential(&self) -> Result<Option<Credential>> {
        Ok(Some(self.credential.clone()))
    }
}
