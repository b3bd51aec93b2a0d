use std::fmt::Debug;
use std::time::Duration;

use http::request::Parts;
use http::uri::PathAndQuery;
use http::Uri;

use crate::context::SigningContext;
use crate::Error;
use crate::Result;

/// Sign mutates an HTTP request so it carries a verifiable signature.
///
/// Implementations dispatch on [`SigningContext::auth_method_query`]: header
/// mode places the proof in an `Authorization` header, query mode rewrites
/// the URL so the proof lives entirely in its query string.
pub trait Sign: Debug + Send + Sync + 'static {
    /// Sign the request in place, filling the context's output fields.
    ///
    /// Fails fast, before any mutation, when the credential has no keys or
    /// the request has no authority to address.
    fn sign(&self, parts: &mut Parts, ctx: &mut SigningContext) -> Result<()>;

    /// Whether a header with this name participates in the signature.
    fn is_signed_header(&self, ctx: &SigningContext, name: &str) -> bool {
        let name = name.to_lowercase();
        name.starts_with(&ctx.header_prefix())
            || name == "content-type"
            || name == "content-md5"
            || name == "date"
    }

    /// The longest presign lifetime this scheme accepts, `None` when the
    /// scheme imposes no bound.
    fn max_expires(&self) -> Option<Duration> {
        None
    }
}

/// Check the fail-fast preconditions shared by all schemes.
pub(crate) fn check_preconditions(parts: &Parts, ctx: &SigningContext) -> Result<()> {
    if !ctx.credentials.has_keys() {
        return Err(Error::empty_credentials(
            "access key id and secret are required for signing",
        ));
    }
    if parts.uri.authority().is_none() {
        return Err(Error::empty_request(
            "request without authority cannot be signed",
        ));
    }
    Ok(())
}

/// Record the headers the scheme considers signed onto the context.
pub(crate) fn collect_signed_headers(
    signer: &dyn Sign,
    parts: &Parts,
    ctx: &mut SigningContext,
) -> Result<()> {
    let mut headers = Vec::new();
    for (name, value) in parts.headers.iter() {
        if signer.is_signed_header(ctx, name.as_str()) {
            headers.push((name.as_str().to_lowercase(), value.to_str()?.to_string()));
        }
    }
    headers.sort();
    ctx.signed_headers = headers;
    Ok(())
}

/// Split a raw query string into ordered pairs, keeping the original
/// percent-encoding intact. A component without `=` becomes a bare key.
pub(crate) fn parse_raw_query(query: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for pair in query.split('&') {
        if let Some((key, value)) = pair.split_once('=') {
            pairs.push((key.to_string(), value.to_string()));
        } else if !pair.is_empty() {
            pairs.push((pair.to_string(), String::new()));
        }
    }
    pairs
}

/// Serialize query pairs back into a raw query string, emitting a bare key
/// when the value is empty.
pub(crate) fn serialize_raw_query(pairs: &[(String, String)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| {
            if v.is_empty() {
                k.clone()
            } else {
                format!("{k}={v}")
            }
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Rewrite the request URI with a new raw query string.
pub(crate) fn replace_query(parts: &mut Parts, query: &str) -> Result<()> {
    let mut uri_parts = std::mem::take(&mut parts.uri).into_parts();
    let path = uri_parts
        .path_and_query
        .as_ref()
        .map(|paq| paq.path().to_string())
        .unwrap_or_else(|| "/".to_string());
    let paq = if query.is_empty() {
        path
    } else {
        format!("{path}?{query}")
    };
    uri_parts.path_and_query = Some(PathAndQuery::try_from(paq.as_str())?);
    parts.uri = Uri::from_parts(uri_parts)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_raw_query_keeps_order_and_encoding() {
        let pairs = parse_raw_query("b=%2Fv&a&c=1");
        assert_eq!(
            pairs,
            vec![
                ("b".to_string(), "%2Fv".to_string()),
                ("a".to_string(), String::new()),
                ("c".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_serialize_raw_query_bare_keys() {
        let pairs = vec![
            ("acl".to_string(), String::new()),
            ("versionId".to_string(), "v1".to_string()),
        ];
        assert_eq!(serialize_raw_query(&pairs), "acl&versionId=v1");
    }

    #[test]
    fn test_replace_query() {
        let mut parts = http::Request::builder()
            .uri("https://b.oss.example.com/k?old=1")
            .body(())
            .unwrap()
            .into_parts()
            .0;
        replace_query(&mut parts, "new=2").unwrap();
        assert_eq!(
            parts.uri.to_string(),
            "https://b.oss.example.com/k?new=2"
        );
    }
}
