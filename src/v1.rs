//! The legacy HMAC-SHA1 signing scheme.

use std::fmt::Write;

use http::header::{HeaderName, AUTHORIZATION, CONTENT_TYPE, DATE};
use http::request::Parts;
use http::HeaderValue;
use log::debug;
use percent_encoding::{percent_decode_str, utf8_percent_encode};

use crate::constants::{
    is_sub_resource, CONTENT_MD5, HEADER_SECURITY_TOKEN, QUERY_ACCESS_KEY_ID, QUERY_ENCODE_SET,
    QUERY_EXPIRES, QUERY_SECURITY_TOKEN, QUERY_SIGNATURE,
};
use crate::context::SigningContext;
use crate::hash::base64_hmac_sha1;
use crate::signer::{
    check_preconditions, collect_signed_headers, parse_raw_query, replace_query,
    serialize_raw_query, Sign,
};
use crate::time::format_http_date;
use crate::Result;

/// SignerV1 implements the legacy signature scheme.
///
/// The string-to-sign is
///
/// ```text
///   VERB + "\n"
/// + Content-MD5 + "\n"
/// + Content-Type + "\n"
/// + Date + "\n"
/// + CanonicalizedHeaders
/// + CanonicalizedResource
/// ```
///
/// signed with `base64(HMAC-SHA1(secret, string_to_sign))`. Header mode
/// places the proof in `Authorization: OSS {id}:{signature}`; query mode
/// embeds it as URL parameters so the URL stays replayable until `Expires`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignerV1;

impl SignerV1 {
    /// Create a new legacy signer.
    pub fn new() -> Self {
        Self
    }
}

impl Sign for SignerV1 {
    fn sign(&self, parts: &mut Parts, ctx: &mut SigningContext) -> Result<()> {
        check_preconditions(parts, ctx)?;

        if ctx.auth_method_query {
            self.sign_query(parts, ctx)?;
        } else {
            self.sign_header(parts, ctx)?;
        }

        collect_signed_headers(self, parts, ctx)
    }
}

impl SignerV1 {
    fn sign_header(&self, parts: &mut Parts, ctx: &mut SigningContext) -> Result<()> {
        let signing_time = ctx.resolve_signing_time();
        let date = format_http_date(signing_time);

        parts.headers.insert(DATE, date.parse()?);

        if let Some(token) = &ctx.credentials.security_token {
            let mut value: HeaderValue = token.parse()?;
            value.set_sensitive(true);
            parts
                .headers
                .insert(HeaderName::from_static(HEADER_SECURITY_TOKEN), value);
        }

        // The headers just written are visible to canonicalization.
        let string_to_sign = string_to_sign(parts, ctx, &date)?;
        let signature = base64_hmac_sha1(
            ctx.credentials.access_key_secret.as_bytes(),
            string_to_sign.as_bytes(),
        );

        let mut authorization: HeaderValue =
            format!("OSS {}:{}", ctx.credentials.access_key_id, signature).parse()?;
        authorization.set_sensitive(true);
        parts.headers.insert(AUTHORIZATION, authorization);

        ctx.string_to_sign = string_to_sign;
        Ok(())
    }

    fn sign_query(&self, parts: &mut Parts, ctx: &mut SigningContext) -> Result<()> {
        let signing_time = ctx.resolve_signing_time();
        let expiration = ctx.resolve_expiration_time(signing_time);
        let expires = expiration.timestamp().to_string();

        let mut pairs = parse_raw_query(parts.uri.query().unwrap_or_default());
        // Strip anything a previously signed URL may have left behind.
        pairs.retain(|(k, _)| {
            k != QUERY_SIGNATURE && k != QUERY_SECURITY_TOKEN && k != QUERY_ACCESS_KEY_ID && k != QUERY_EXPIRES
        });

        pairs.push((
            QUERY_ACCESS_KEY_ID.to_string(),
            ctx.credentials.access_key_id.clone(),
        ));
        pairs.push((QUERY_EXPIRES.to_string(), expires.clone()));
        if let Some(token) = &ctx.credentials.security_token {
            pairs.push((
                QUERY_SECURITY_TOKEN.to_string(),
                utf8_percent_encode(token, &QUERY_ENCODE_SET).to_string(),
            ));
        }

        let query = serialize_raw_query(&pairs);
        replace_query(parts, &query)?;

        // The Expires value takes the Date slot in the string-to-sign.
        let string_to_sign = string_to_sign(parts, ctx, &expires)?;
        let signature = base64_hmac_sha1(
            ctx.credentials.access_key_secret.as_bytes(),
            string_to_sign.as_bytes(),
        );

        let query = format!(
            "{query}&{QUERY_SIGNATURE}={}",
            utf8_percent_encode(&signature, &QUERY_ENCODE_SET)
        );
        replace_query(parts, &query)?;

        ctx.string_to_sign = string_to_sign;
        Ok(())
    }
}

fn string_to_sign(parts: &Parts, ctx: &SigningContext, date: &str) -> Result<String> {
    fn header_get_or_default<'a>(parts: &'a Parts, key: &HeaderName) -> Result<&'a str> {
        match parts.headers.get(key) {
            Some(v) => Ok(v.to_str()?),
            None => Ok(""),
        }
    }

    let mut s = String::new();
    writeln!(s, "{}", parts.method.as_str())?;
    writeln!(
        s,
        "{}",
        header_get_or_default(parts, &HeaderName::from_static(CONTENT_MD5))?
    )?;
    writeln!(s, "{}", header_get_or_default(parts, &CONTENT_TYPE)?)?;
    writeln!(s, "{date}")?;

    let headers = canonicalize_headers(parts, ctx)?;
    if !headers.is_empty() {
        writeln!(s, "{headers}")?;
    }
    write!(s, "{}{}", ctx.resource_path(), canonicalize_query(parts, ctx))?;

    debug!("string to sign: {}", &s);
    Ok(s)
}

/// Keep only product-prefixed headers, lower-cased and sorted by name.
///
/// `Content-Type`, `Content-MD5` and `Date` never appear here: they are
/// accounted for by the fixed leading lines of the string-to-sign.
fn canonicalize_headers(parts: &Parts, ctx: &SigningContext) -> Result<String> {
    let prefix = ctx.header_prefix();
    let mut headers = Vec::new();
    for (name, value) in parts.headers.iter() {
        let name = name.as_str().to_lowercase();
        if name.starts_with(&prefix) {
            headers.push((name, value.to_str()?.to_string()));
        }
    }
    headers.sort();

    Ok(headers
        .iter()
        .map(|(k, v)| format!("{k}:{v}"))
        .collect::<Vec<_>>()
        .join("\n"))
}

/// Keep only whitelisted sub-resources and caller-listed extras, URL-decoded
/// and sorted lexicographically by key. Unknown keys are silently excluded,
/// they neither affect nor invalidate the signature.
fn canonicalize_query(parts: &Parts, ctx: &SigningContext) -> String {
    let mut pairs: Vec<(String, String)> = parse_raw_query(parts.uri.query().unwrap_or_default())
        .into_iter()
        .map(|(k, v)| {
            (
                percent_decode_str(&k).decode_utf8_lossy().into_owned(),
                percent_decode_str(&v).decode_utf8_lossy().into_owned(),
            )
        })
        .filter(|(k, _)| is_sub_resource(k) || ctx.sub_resources.iter().any(|s| s == k))
        .collect();

    if pairs.is_empty() {
        return String::new();
    }
    pairs.sort();

    format!("?{}", serialize_raw_query(&pairs))
}
