use chrono::TimeDelta;

use crate::constants::DEFAULT_EXPIRES_IN_SECS;
use crate::constants::DEFAULT_PRODUCT;
use crate::credential::Credential;
use crate::time::{now, DateTime};

/// SigningContext is the per-call carrier assembled by the caller and
/// consumed by a [`Sign`][crate::Sign] implementation.
///
/// Caller-supplied fields are never cleared by `sign()`; the output fields
/// (`string_to_sign`, `signed_headers`) are filled in as signing proceeds.
/// A fresh context is expected per call, nothing in it persists.
#[derive(Debug, Clone)]
pub struct SigningContext {
    /// Product name, drives the `x-{product}-` header prefix.
    pub product: String,
    /// Region the request targets, only used by the scoped scheme.
    pub region: String,
    /// Bucket addressed by the request, absent for service-level operations.
    pub bucket: Option<String>,
    /// Object key addressed by the request, absent for bucket-level operations.
    pub key: Option<String>,
    /// Credential snapshot used for this call.
    pub credentials: Credential,
    /// Sign into query parameters (presign) instead of headers.
    pub auth_method_query: bool,
    /// Signing time override. When unset, `now() + clock_offset` is used and
    /// the resolved value is written back here.
    pub signing_time: Option<DateTime>,
    /// Offset applied to wall-clock reads, compensating client clock skew.
    pub clock_offset: TimeDelta,
    /// Extra header names the scoped scheme must sign in addition to the
    /// defaults.
    pub additional_headers: Vec<String>,
    /// Extra query keys the legacy canonicalization must keep in addition to
    /// the built-in sub-resource whitelist.
    pub sub_resources: Vec<String>,
    /// Expiration for query-mode signing. When unset, defaults to 15 minutes
    /// from the signing time and the resolved value is written back here.
    pub expiration_time: Option<DateTime>,

    /// Output: the canonical string the signature was computed over.
    pub string_to_sign: String,
    /// Output: the headers the signer considers signed, as lower-cased
    /// name/value pairs.
    pub signed_headers: Vec<(String, String)>,
}

impl Default for SigningContext {
    fn default() -> Self {
        Self {
            product: DEFAULT_PRODUCT.to_string(),
            region: String::new(),
            bucket: None,
            key: None,
            credentials: Credential::default(),
            auth_method_query: false,
            signing_time: None,
            clock_offset: TimeDelta::zero(),
            additional_headers: Vec::new(),
            sub_resources: Vec::new(),
            expiration_time: None,
            string_to_sign: String::new(),
            signed_headers: Vec::new(),
        }
    }
}

impl SigningContext {
    /// Create a context for the given credential with everything else at its
    /// default.
    pub fn new(credentials: Credential) -> Self {
        Self {
            credentials,
            ..Default::default()
        }
    }

    /// The lower-cased header prefix this context signs under, e.g. `x-oss-`.
    pub fn header_prefix(&self) -> String {
        format!("x-{}-", self.product)
    }

    /// Resolve the effective signing time and record it on the context.
    pub(crate) fn resolve_signing_time(&mut self) -> DateTime {
        let t = match self.signing_time {
            Some(t) => t,
            None => now() + self.clock_offset,
        };
        self.signing_time = Some(t);
        t
    }

    /// Resolve the effective expiration time and record it on the context.
    pub(crate) fn resolve_expiration_time(&mut self, signing_time: DateTime) -> DateTime {
        let t = self
            .expiration_time
            .unwrap_or_else(|| signing_time + TimeDelta::seconds(DEFAULT_EXPIRES_IN_SECS));
        self.expiration_time = Some(t);
        t
    }

    /// The canonical resource path: `/` + bucket + `/` + key, each segment
    /// omitted when absent. Service-level requests legitimately canonicalize
    /// to `/`.
    pub(crate) fn resource_path(&self) -> String {
        let mut s = String::from("/");
        if let Some(bucket) = &self.bucket {
            s.push_str(bucket);
            s.push('/');
        }
        if let Some(key) = &self.key {
            s.push_str(key);
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono::Utc;

    #[test]
    fn test_resource_path() {
        let mut ctx = SigningContext::default();
        assert_eq!(ctx.resource_path(), "/");

        ctx.bucket = Some("b".to_string());
        assert_eq!(ctx.resource_path(), "/b/");

        ctx.key = Some("k".to_string());
        assert_eq!(ctx.resource_path(), "/b/k");
    }

    #[test]
    fn test_resolve_signing_time_pins_caller_value() {
        let t = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        let mut ctx = SigningContext {
            signing_time: Some(t),
            ..Default::default()
        };
        assert_eq!(ctx.resolve_signing_time(), t);
        assert_eq!(ctx.signing_time, Some(t));
    }

    #[test]
    fn test_resolve_expiration_defaults_to_fifteen_minutes() {
        let t = Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap();
        let mut ctx = SigningContext::default();
        let exp = ctx.resolve_expiration_time(t);
        assert_eq!(exp, t + TimeDelta::minutes(15));
        assert_eq!(ctx.expiration_time, Some(exp));
    }
}
