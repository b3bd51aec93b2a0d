//! The date/region scoped HMAC-SHA256 signing scheme.

use std::fmt::Write;
use std::time::Duration;

use http::header::{HeaderName, DATE};
use http::request::Parts;
use http::HeaderValue;
use log::debug;
use percent_encoding::{percent_decode_str, utf8_percent_encode};

use crate::constants::{
    QUERY_ENCODE_SET, UNSIGNED_PAYLOAD, URI_ENCODE_SET, V4_ALGORITHM, V4_MAX_EXPIRES_IN_SECS,
    V4_REQUEST, V4_SECRET_PREFIX,
};
use crate::context::SigningContext;
use crate::hash::{hex_hmac_sha256, hex_sha256, hmac_sha256};
use crate::signer::{
    check_preconditions, collect_signed_headers, parse_raw_query, replace_query,
    serialize_raw_query, Sign,
};
use crate::time::{format_date, format_http_date, format_iso8601, DateTime};
use crate::Error;
use crate::Result;

/// SignerV4 implements the date/region scoped signature scheme.
///
/// The signature is computed over a hashed canonical request with a signing
/// key derived from the secret through an HMAC-SHA256 chain over date,
/// region and product. Presigned URLs produced by this scheme are capped at
/// seven days of validity by the remote verifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignerV4;

impl SignerV4 {
    /// Create a new scoped signer.
    pub fn new() -> Self {
        Self
    }
}

impl Sign for SignerV4 {
    fn sign(&self, parts: &mut Parts, ctx: &mut SigningContext) -> Result<()> {
        check_preconditions(parts, ctx)?;

        if ctx.auth_method_query {
            self.sign_query(parts, ctx)?;
        } else {
            self.sign_header(parts, ctx)?;
        }

        collect_signed_headers(self, parts, ctx)
    }

    fn max_expires(&self) -> Option<Duration> {
        Some(Duration::from_secs(V4_MAX_EXPIRES_IN_SECS))
    }
}

impl SignerV4 {
    fn sign_header(&self, parts: &mut Parts, ctx: &mut SigningContext) -> Result<()> {
        let signing_time = ctx.resolve_signing_time();
        let prefix = ctx.header_prefix();

        parts
            .headers
            .insert(DATE, format_http_date(signing_time).parse()?);
        parts.headers.insert(
            HeaderName::try_from(format!("{prefix}date"))?,
            format_iso8601(signing_time).parse()?,
        );

        let sha256_header = HeaderName::try_from(format!("{prefix}content-sha256"))?;
        if !parts.headers.contains_key(&sha256_header) {
            parts
                .headers
                .insert(sha256_header, HeaderValue::from_static(UNSIGNED_PAYLOAD));
        }

        if let Some(token) = &ctx.credentials.security_token {
            let mut value: HeaderValue = token.parse()?;
            value.set_sensitive(true);
            parts
                .headers
                .insert(HeaderName::try_from(format!("{prefix}security-token"))?, value);
        }

        let additional = additional_header_names(parts, ctx);
        let string_to_sign = self.string_to_sign(parts, ctx, signing_time, &additional)?;
        let signature = self.signature(ctx, signing_time, &string_to_sign);

        let mut authorization = String::with_capacity(128);
        write!(
            authorization,
            "{V4_ALGORITHM} Credential={}/{}",
            ctx.credentials.access_key_id,
            scope(signing_time, ctx)
        )?;
        if !additional.is_empty() {
            write!(authorization, ",AdditionalHeaders={}", additional.join(";"))?;
        }
        write!(authorization, ",Signature={signature}")?;

        let mut value: HeaderValue = authorization.parse()?;
        value.set_sensitive(true);
        parts.headers.insert(http::header::AUTHORIZATION, value);

        ctx.string_to_sign = string_to_sign;
        Ok(())
    }

    fn sign_query(&self, parts: &mut Parts, ctx: &mut SigningContext) -> Result<()> {
        let signing_time = ctx.resolve_signing_time();
        let expiration = ctx.resolve_expiration_time(signing_time);
        let expires = (expiration - signing_time).num_seconds();
        if expires < 0 {
            return Err(Error::invalid_param(
                "expiration_time is before the signing time",
            ));
        }
        let prefix = ctx.header_prefix();
        let additional = additional_header_names(parts, ctx);

        let mut pairs = parse_raw_query(parts.uri.query().unwrap_or_default());
        // Strip only what a previously signed URL may have left behind;
        // caller-supplied product-prefixed parameters stay untouched.
        let auth_params = [
            format!("{prefix}signature"),
            format!("{prefix}signature-version"),
            format!("{prefix}credential"),
            format!("{prefix}date"),
            format!("{prefix}expires"),
            format!("{prefix}additional-headers"),
            format!("{prefix}security-token"),
        ];
        pairs.retain(|(k, _)| !auth_params.iter().any(|p| p == k));

        pairs.push((format!("{prefix}signature-version"), V4_ALGORITHM.to_string()));
        pairs.push((
            format!("{prefix}credential"),
            utf8_percent_encode(
                &format!("{}/{}", ctx.credentials.access_key_id, scope(signing_time, ctx)),
                &QUERY_ENCODE_SET,
            )
            .to_string(),
        ));
        pairs.push((format!("{prefix}date"), format_iso8601(signing_time)));
        pairs.push((format!("{prefix}expires"), expires.to_string()));
        if !additional.is_empty() {
            pairs.push((
                format!("{prefix}additional-headers"),
                utf8_percent_encode(&additional.join(";"), &QUERY_ENCODE_SET).to_string(),
            ));
        }
        if let Some(token) = &ctx.credentials.security_token {
            pairs.push((
                format!("{prefix}security-token"),
                utf8_percent_encode(token, &QUERY_ENCODE_SET).to_string(),
            ));
        }

        let query = serialize_raw_query(&pairs);
        replace_query(parts, &query)?;

        let string_to_sign = self.string_to_sign(parts, ctx, signing_time, &additional)?;
        let signature = self.signature(ctx, signing_time, &string_to_sign);

        let query = format!("{query}&{prefix}signature={signature}");
        replace_query(parts, &query)?;

        ctx.string_to_sign = string_to_sign;
        Ok(())
    }

    fn string_to_sign(
        &self,
        parts: &Parts,
        ctx: &SigningContext,
        signing_time: DateTime,
        additional: &[String],
    ) -> Result<String> {
        let canonical_request = canonical_request(parts, ctx, additional)?;
        debug!("canonical request: {}", &canonical_request);

        let mut s = String::with_capacity(128);
        writeln!(s, "{V4_ALGORITHM}")?;
        writeln!(s, "{}", format_iso8601(signing_time))?;
        writeln!(s, "{}", scope(signing_time, ctx))?;
        write!(s, "{}", hex_sha256(canonical_request.as_bytes()))?;

        debug!("string to sign: {}", &s);
        Ok(s)
    }

    fn signature(&self, ctx: &SigningContext, signing_time: DateTime, string_to_sign: &str) -> String {
        let key = signing_key(
            &ctx.credentials.access_key_secret,
            signing_time,
            &ctx.region,
            &ctx.product,
        );
        hex_hmac_sha256(&key, string_to_sign.as_bytes())
    }
}

/// Credential scope: `{date}/{region}/{product}/aliyun_v4_request`.
fn scope(signing_time: DateTime, ctx: &SigningContext) -> String {
    format!(
        "{}/{}/{}/{V4_REQUEST}",
        format_date(signing_time),
        ctx.region,
        ctx.product
    )
}

/// Derive the signing key through the HMAC-SHA256 chain.
fn signing_key(secret: &str, signing_time: DateTime, region: &str, product: &str) -> Vec<u8> {
    let secret = format!("{V4_SECRET_PREFIX}{secret}");
    let k_date = hmac_sha256(secret.as_bytes(), format_date(signing_time).as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_product = hmac_sha256(&k_region, product.as_bytes());
    hmac_sha256(&k_product, V4_REQUEST.as_bytes())
}

/// Caller-listed header names that join the signature beyond the defaults.
///
/// Product-prefixed names and `content-type`/`content-md5` are already signed
/// and never repeated here; names absent from the request are dropped.
fn additional_header_names(parts: &Parts, ctx: &SigningContext) -> Vec<String> {
    let prefix = ctx.header_prefix();
    let mut names: Vec<String> = ctx
        .additional_headers
        .iter()
        .map(|v| v.to_lowercase())
        .filter(|v| {
            !v.starts_with(&prefix)
                && v != "content-type"
                && v != "content-md5"
                && parts.headers.contains_key(v.as_str())
        })
        .collect();
    names.sort();
    names.dedup();
    names
}

/// Build the canonical request:
///
/// ```text
///   VERB + "\n"
/// + CanonicalURI + "\n"
/// + CanonicalQuery + "\n"
/// + CanonicalHeaders + "\n"
/// + AdditionalHeaderNames + "\n"
/// + HashedPayload
/// ```
fn canonical_request(parts: &Parts, ctx: &SigningContext, additional: &[String]) -> Result<String> {
    let prefix = ctx.header_prefix();

    let mut f = String::with_capacity(256);
    writeln!(f, "{}", parts.method.as_str())?;
    writeln!(
        f,
        "{}",
        utf8_percent_encode(&ctx.resource_path(), &URI_ENCODE_SET)
    )?;

    // Unlike the legacy scheme, every query parameter participates.
    let mut query: Vec<(String, String)> = parse_raw_query(parts.uri.query().unwrap_or_default())
        .into_iter()
        .map(|(k, v)| {
            (
                utf8_percent_encode(&percent_decode_str(&k).decode_utf8_lossy(), &QUERY_ENCODE_SET)
                    .to_string(),
                utf8_percent_encode(&percent_decode_str(&v).decode_utf8_lossy(), &QUERY_ENCODE_SET)
                    .to_string(),
            )
        })
        .collect();
    query.sort();
    writeln!(f, "{}", serialize_raw_query(&query))?;

    let mut headers = Vec::new();
    for (name, value) in parts.headers.iter() {
        let name = name.as_str().to_lowercase();
        if name.starts_with(&prefix)
            || name == "content-type"
            || name == "content-md5"
            || additional.contains(&name)
        {
            headers.push((name, value.to_str()?.trim().to_string()));
        }
    }
    headers.sort();
    for (name, value) in &headers {
        writeln!(f, "{name}:{value}")?;
    }
    writeln!(f)?;

    writeln!(f, "{}", additional.join(";"))?;

    let payload = parts
        .headers
        .get(format!("{prefix}content-sha256"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or(UNSIGNED_PAYLOAD);
    write!(f, "{payload}")?;

    Ok(f)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::Credential;
    use chrono::{TimeDelta, TimeZone, Utc};
    use http::header::AUTHORIZATION;
    use http::Method;
    use pretty_assertions::assert_eq;

    fn test_time() -> DateTime {
        Utc.with_ymd_and_hms(2022, 1, 1, 0, 0, 0).unwrap()
    }

    fn test_context(query: bool) -> SigningContext {
        SigningContext {
            region: "cn-hangzhou".to_string(),
            bucket: Some("b".to_string()),
            key: Some("k".to_string()),
            credentials: Credential::new("ak", "sk"),
            auth_method_query: query,
            signing_time: Some(test_time()),
            ..Default::default()
        }
    }

    fn test_parts(method: Method, uri: &str) -> Parts {
        let mut req = http::Request::new(());
        *req.method_mut() = method;
        *req.uri_mut() = uri.parse().expect("uri must be valid");
        req.into_parts().0
    }

    #[test]
    fn test_header_signing() {
        let mut parts = test_parts(Method::GET, "https://b.oss-cn-hangzhou.aliyuncs.com/k");
        let mut ctx = test_context(false);

        SignerV4::new().sign(&mut parts, &mut ctx).unwrap();

        assert_eq!(parts.headers["x-oss-date"], "20220101T000000Z");
        assert_eq!(parts.headers["x-oss-content-sha256"], UNSIGNED_PAYLOAD);
        assert_eq!(
            parts.headers[AUTHORIZATION],
            "OSS4-HMAC-SHA256 Credential=ak/20220101/cn-hangzhou/oss/aliyun_v4_request,Signature=1a4464bd7909100b53665a4db8297c48b9662b48dc1405493ca217ce37016014"
        );
        assert_eq!(
            ctx.string_to_sign,
            "OSS4-HMAC-SHA256\n20220101T000000Z\n20220101/cn-hangzhou/oss/aliyun_v4_request\n8e9a52fc9579e06c42156b8ed5d5787417b108bddf9147ca8cad7255eb6bf91d"
        );
    }

    #[test]
    fn test_header_signing_is_deterministic() {
        let signer = SignerV4::new();
        let mut first = test_parts(Method::GET, "https://b.oss-cn-hangzhou.aliyuncs.com/k");
        let mut second = test_parts(Method::GET, "https://b.oss-cn-hangzhou.aliyuncs.com/k");
        let mut ctx1 = test_context(false);
        let mut ctx2 = test_context(false);

        signer.sign(&mut first, &mut ctx1).unwrap();
        signer.sign(&mut second, &mut ctx2).unwrap();

        assert_eq!(first.headers[AUTHORIZATION], second.headers[AUTHORIZATION]);
        assert_eq!(ctx1.string_to_sign, ctx2.string_to_sign);
    }

    #[test]
    fn test_additional_headers_join_the_signature() {
        let mut parts = test_parts(Method::GET, "https://b.oss-cn-hangzhou.aliyuncs.com/k");
        parts
            .headers
            .insert("cache-control", "no-store".parse().unwrap());
        let mut ctx = test_context(false);
        ctx.additional_headers = vec!["Cache-Control".to_string()];

        SignerV4::new().sign(&mut parts, &mut ctx).unwrap();

        let auth = parts.headers[AUTHORIZATION].to_str().unwrap();
        assert!(auth.contains(",AdditionalHeaders=cache-control,"));
    }

    #[test]
    fn test_query_signing() {
        let mut parts = test_parts(Method::GET, "https://b.oss-cn-hangzhou.aliyuncs.com/k");
        let mut ctx = test_context(true);
        ctx.expiration_time = Some(test_time() + TimeDelta::minutes(15));

        SignerV4::new().sign(&mut parts, &mut ctx).unwrap();

        let query = parts.uri.query().unwrap();
        assert!(query.contains("x-oss-signature-version=OSS4-HMAC-SHA256"));
        assert!(query.contains(
            "x-oss-credential=ak%2F20220101%2Fcn-hangzhou%2Foss%2Faliyun_v4_request"
        ));
        assert!(query.contains("x-oss-date=20220101T000000Z"));
        assert!(query.contains("x-oss-expires=900"));
        let signature = query.rsplit("x-oss-signature=").next().unwrap();
        assert_eq!(signature.len(), 64);
        assert!(signature.bytes().all(|b| b.is_ascii_hexdigit()));
        assert!(!parts.headers.contains_key(AUTHORIZATION));
    }

    #[test]
    fn test_query_signing_keeps_caller_product_params() {
        let mut parts = test_parts(
            Method::GET,
            "https://b.oss-cn-hangzhou.aliyuncs.com/k?x-oss-process=image%2Fresize",
        );
        let mut ctx = test_context(true);
        ctx.expiration_time = Some(test_time() + TimeDelta::minutes(15));

        SignerV4::new().sign(&mut parts, &mut ctx).unwrap();

        let query = parts.uri.query().unwrap();
        assert!(query.contains("x-oss-process=image%2Fresize"));
        assert!(query.contains("x-oss-signature="));
    }

    #[test]
    fn test_query_signing_rejects_expiration_before_signing_time() {
        let mut parts = test_parts(Method::GET, "https://b.oss-cn-hangzhou.aliyuncs.com/k");
        let mut ctx = test_context(true);
        ctx.expiration_time = Some(test_time() - TimeDelta::minutes(1));

        let err = SignerV4::new().sign(&mut parts, &mut ctx).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidParam);
    }

    #[test]
    fn test_query_signing_strips_previous_signature() {
        let mut parts = test_parts(
            Method::GET,
            "https://b.oss-cn-hangzhou.aliyuncs.com/k?x-oss-signature=stale&x-oss-date=stale",
        );
        let mut ctx = test_context(true);

        SignerV4::new().sign(&mut parts, &mut ctx).unwrap();

        assert!(!parts.uri.query().unwrap().contains("stale"));
    }

    #[test]
    fn test_max_expires_is_seven_days() {
        assert_eq!(
            SignerV4::new().max_expires(),
            Some(Duration::from_secs(7 * 24 * 3600))
        );
    }
}
