//! Presigned URL orchestration.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::TimeDelta;
use http::Method;
use http::StatusCode;
use http::Uri;
use log::debug;
use percent_encoding::utf8_percent_encode;

use crate::constants::{QUERY_ENCODE_SET, URI_ENCODE_SET};
use crate::context::SigningContext;
use crate::credential::ProvideCredential;
use crate::signer::{serialize_raw_query, Sign};
use crate::time::{now, DateTime};
use crate::transport::{HttpSend, NullHttpSend};
use crate::{Error, Result};

/// A strongly-typed operation that can be turned into a presigned URL.
///
/// Only operations whose authentication can live entirely in the URL are
/// representable here; everything else keeps going through the normal
/// header-signed dispatch path.
#[derive(Debug, Clone)]
pub enum PresignRequest {
    /// Download an object.
    GetObject {
        /// Bucket holding the object.
        bucket: String,
        /// Object key.
        key: String,
        /// Address a specific version instead of the current one.
        version_id: Option<String>,
    },
    /// Upload an object.
    PutObject {
        /// Bucket holding the object.
        bucket: String,
        /// Object key.
        key: String,
    },
    /// Read object metadata.
    HeadObject {
        /// Bucket holding the object.
        bucket: String,
        /// Object key.
        key: String,
        /// Address a specific version instead of the current one.
        version_id: Option<String>,
    },
    /// Start a multipart upload.
    InitiateMultipartUpload {
        /// Bucket holding the object.
        bucket: String,
        /// Object key.
        key: String,
    },
    /// Upload one part of a multipart upload.
    UploadPart {
        /// Bucket holding the object.
        bucket: String,
        /// Object key.
        key: String,
        /// Part number, starting from 1.
        part_number: u32,
        /// Upload id returned when the multipart upload was initiated.
        upload_id: String,
    },
    /// Complete a multipart upload.
    CompleteMultipartUpload {
        /// Bucket holding the object.
        bucket: String,
        /// Object key.
        key: String,
        /// Upload id returned when the multipart upload was initiated.
        upload_id: String,
    },
    /// Abort a multipart upload.
    AbortMultipartUpload {
        /// Bucket holding the object.
        bucket: String,
        /// Object key.
        key: String,
        /// Upload id returned when the multipart upload was initiated.
        upload_id: String,
    },
}

/// Generic descriptor a typed presign request lowers into.
#[derive(Debug, Clone)]
struct OperationInput {
    name: &'static str,
    method: Method,
    bucket: String,
    key: String,
    parameters: Vec<(String, String)>,
}

impl PresignRequest {
    fn into_operation(self) -> Result<OperationInput> {
        let (name, method, bucket, key, parameters) = match self {
            PresignRequest::GetObject {
                bucket,
                key,
                version_id,
            } => (
                "GetObject",
                Method::GET,
                bucket,
                key,
                version_param(version_id),
            ),
            PresignRequest::PutObject { bucket, key } => {
                ("PutObject", Method::PUT, bucket, key, Vec::new())
            }
            PresignRequest::HeadObject {
                bucket,
                key,
                version_id,
            } => (
                "HeadObject",
                Method::HEAD,
                bucket,
                key,
                version_param(version_id),
            ),
            PresignRequest::InitiateMultipartUpload { bucket, key } => (
                "InitiateMultipartUpload",
                Method::POST,
                bucket,
                key,
                vec![("uploads".to_string(), String::new())],
            ),
            PresignRequest::UploadPart {
                bucket,
                key,
                part_number,
                upload_id,
            } => {
                if !(1..=10000).contains(&part_number) {
                    return Err(Error::invalid_param(
                        "request.part_number must be within [1, 10000]",
                    ));
                }
                if upload_id.is_empty() {
                    return Err(Error::invalid_param("request.upload_id is required"));
                }
                (
                    "UploadPart",
                    Method::PUT,
                    bucket,
                    key,
                    vec![
                        ("partNumber".to_string(), part_number.to_string()),
                        ("uploadId".to_string(), upload_id),
                    ],
                )
            }
            PresignRequest::CompleteMultipartUpload {
                bucket,
                key,
                upload_id,
            } => {
                if upload_id.is_empty() {
                    return Err(Error::invalid_param("request.upload_id is required"));
                }
                (
                    "CompleteMultipartUpload",
                    Method::POST,
                    bucket,
                    key,
                    vec![("uploadId".to_string(), upload_id)],
                )
            }
            PresignRequest::AbortMultipartUpload {
                bucket,
                key,
                upload_id,
            } => {
                if upload_id.is_empty() {
                    return Err(Error::invalid_param("request.upload_id is required"));
                }
                (
                    "AbortMultipartUpload",
                    Method::DELETE,
                    bucket,
                    key,
                    vec![("uploadId".to_string(), upload_id)],
                )
            }
        };

        if bucket.is_empty() {
            return Err(Error::invalid_param("request.bucket is required"));
        }
        if key.is_empty() {
            return Err(Error::invalid_param("request.key is required"));
        }

        Ok(OperationInput {
            name,
            method,
            bucket,
            key,
            parameters,
        })
    }
}

fn version_param(version_id: Option<String>) -> Vec<(String, String)> {
    match version_id {
        Some(v) => vec![("versionId".to_string(), v)],
        None => Vec::new(),
    }
}

/// Expiration policy for a presign call.
///
/// When both are set, `expiration` wins. When neither is set, the URL lives
/// for 15 minutes.
#[derive(Debug, Clone, Default)]
pub struct PresignOptions {
    /// Lifetime relative to now.
    pub expires_in: Option<Duration>,
    /// Absolute expiration instant.
    pub expiration: Option<DateTime>,
}

impl PresignOptions {
    /// Set a lifetime relative to now.
    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    /// Set an absolute expiration instant.
    pub fn with_expiration(mut self, expiration: DateTime) -> Self {
        self.expiration = Some(expiration);
        self
    }
}

/// The outcome of a presign call: everything a credential-less party needs
/// to replay the operation until it expires.
#[derive(Debug, Clone)]
pub struct PresignResult {
    /// HTTP method the URL must be used with.
    pub method: Method,
    /// The fully self-contained presigned URL.
    pub url: String,
    /// When the URL stops being accepted.
    pub expiration: Option<DateTime>,
    /// Headers that participated in the signature; a user of the URL must
    /// send them unchanged.
    pub signed_headers: Vec<(String, String)>,
}

/// Presigner turns typed operation requests into presigned URLs.
///
/// It builds a throwaway request for the operation, signs it in query mode,
/// routes it through a no-op transport so no network call occurs, and reads
/// the result back out of the mutated request.
#[derive(Debug, Clone)]
pub struct Presigner {
    endpoint: String,
    region: String,
    product: String,
    signer: Arc<dyn Sign>,
    provider: Arc<dyn ProvideCredential>,
    transport: Arc<dyn HttpSend>,
    clock_offset: TimeDelta,
}

impl Presigner {
    /// Create a new presigner for the given endpoint and region.
    pub fn new(
        endpoint: &str,
        region: &str,
        signer: impl Sign,
        provider: impl ProvideCredential,
    ) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            region: region.to_string(),
            product: crate::constants::DEFAULT_PRODUCT.to_string(),
            signer: Arc::new(signer),
            provider: Arc::new(provider),
            transport: Arc::new(NullHttpSend),
            clock_offset: TimeDelta::zero(),
        }
    }

    /// Override the product name.
    pub fn with_product(mut self, product: &str) -> Self {
        self.product = product.to_string();
        self
    }

    /// Replace the transport the signed request is routed through.
    pub fn with_transport(mut self, transport: impl HttpSend) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Compensate a known client clock skew.
    pub fn with_clock_offset(mut self, offset: TimeDelta) -> Self {
        self.clock_offset = offset;
        self
    }

    /// Produce a presigned URL for the given operation.
    pub async fn presign(
        &self,
        request: PresignRequest,
        options: PresignOptions,
    ) -> Result<PresignResult> {
        let input = request.into_operation()?;
        debug!("presigning operation: {}", input.name);

        let uri = self.build_uri(&input)?;
        let mut parts = http::Request::builder()
            .method(input.method.clone())
            .uri(uri)
            .body(())?
            .into_parts()
            .0;

        let credentials = self
            .provider
            .provide_credential()
            .await?
            .ok_or_else(|| Error::empty_credentials("credential provider returned nothing"))?;

        let expiration = self.resolve_expiration(&options)?;
        let mut ctx = SigningContext {
            product: self.product.clone(),
            region: self.region.clone(),
            bucket: Some(input.bucket),
            key: Some(input.key),
            credentials,
            auth_method_query: true,
            clock_offset: self.clock_offset,
            expiration_time: Some(expiration),
            ..Default::default()
        };

        self.signer.sign(&mut parts, &mut ctx)?;

        let method = parts.method.clone();
        let url = parts.uri.to_string();
        let signed_headers = ctx.signed_headers.clone();

        let resp = self
            .transport
            .http_send(http::Request::from_parts(parts, Bytes::new()))
            .await?;
        if resp.status() != StatusCode::OK {
            return Err(Error::unexpected(format!(
                "presign transport returned status {}",
                resp.status()
            )));
        }

        // The scheme's validity cap is checked after signing so callers get
        // the policy error rather than a half-built request error.
        if let Some(max) = self.signer.max_expires() {
            let max = TimeDelta::from_std(max)
                .map_err(|e| Error::unexpected(e.to_string()))?;
            if expiration - now() > max {
                return Err(Error::presign_expiration(format!(
                    "requested expiration exceeds the scheme's maximum of {max}"
                )));
            }
        }

        Ok(PresignResult {
            method,
            url,
            expiration: ctx.expiration_time,
            signed_headers,
        })
    }

    fn resolve_expiration(&self, options: &PresignOptions) -> Result<DateTime> {
        if let Some(expiration) = options.expiration {
            return Ok(expiration);
        }
        let expires_in = match options.expires_in {
            Some(d) => TimeDelta::from_std(d)
                .map_err(|e| Error::invalid_param(format!("expires_in is out of range: {e}")))?,
            None => TimeDelta::seconds(crate::constants::DEFAULT_EXPIRES_IN_SECS),
        };
        Ok(now() + self.clock_offset + expires_in)
    }

    /// Build the virtual-hosted request URL for an operation.
    fn build_uri(&self, input: &OperationInput) -> Result<Uri> {
        let endpoint = if self.endpoint.contains("://") {
            self.endpoint.clone()
        } else {
            format!("https://{}", self.endpoint)
        };
        let endpoint: Uri = endpoint.parse()?;
        let scheme = endpoint.scheme_str().unwrap_or("https");
        let host = endpoint
            .authority()
            .ok_or_else(|| Error::invalid_param("endpoint has no host"))?;

        let path = format!("/{}", utf8_percent_encode(&input.key, &URI_ENCODE_SET));
        let query: Vec<(String, String)> = input
            .parameters
            .iter()
            .map(|(k, v)| {
                (
                    k.clone(),
                    utf8_percent_encode(v, &QUERY_ENCODE_SET).to_string(),
                )
            })
            .collect();

        let mut s = format!("{scheme}://{}.{host}{path}", input.bucket);
        if !query.is_empty() {
            s.push('?');
            s.push_str(&serialize_raw_query(&query));
        }
        Ok(s.parse()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::StaticCredentialProvider;
    use crate::v1::SignerV1;
    use crate::v4::SignerV4;
    use crate::ErrorKind;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn presigner_v1() -> Presigner {
        Presigner::new(
            "oss-cn-hangzhou.aliyuncs.com",
            "cn-hangzhou",
            SignerV1::new(),
            StaticCredentialProvider::new("ak", "sk"),
        )
    }

    fn presigner_v4() -> Presigner {
        Presigner::new(
            "oss-cn-hangzhou.aliyuncs.com",
            "cn-hangzhou",
            SignerV4::new(),
            StaticCredentialProvider::new("ak", "sk"),
        )
    }

    fn get_object() -> PresignRequest {
        PresignRequest::GetObject {
            bucket: "b".to_string(),
            key: "k".to_string(),
            version_id: None,
        }
    }

    #[tokio::test]
    async fn test_presign_defaults_to_fifteen_minutes() -> anyhow::Result<()> {
        let result = presigner_v1()
            .presign(get_object(), PresignOptions::default())
            .await?;

        let expiration = result.expiration.expect("expiration must be set");
        let delta = expiration - now();
        assert!(delta > TimeDelta::minutes(14));
        assert!(delta <= TimeDelta::minutes(15));

        assert_eq!(result.method, Method::GET);
        assert!(result.url.starts_with("https://b.oss-cn-hangzhou.aliyuncs.com/k?"));
        assert!(result.url.contains("OSSAccessKeyId=ak"));
        assert!(result.url.contains("Expires="));
        assert!(result.url.contains("Signature="));
        Ok(())
    }

    #[tokio::test]
    async fn test_presign_absolute_expiration_wins() -> anyhow::Result<()> {
        let expiration = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let options = PresignOptions::default()
            .with_expires_in(Duration::from_secs(60))
            .with_expiration(expiration);

        // The legacy scheme has no validity cap, so a far-future absolute
        // expiration goes through.
        let result = presigner_v1().presign(get_object(), options).await?;
        assert_eq!(result.expiration, Some(expiration));
        assert!(result
            .url
            .contains(&format!("Expires={}", expiration.timestamp())));
        Ok(())
    }

    #[tokio::test]
    async fn test_presign_expiration_guard_applies_to_v4_only() -> anyhow::Result<()> {
        let options =
            PresignOptions::default().with_expires_in(Duration::from_secs(8 * 24 * 3600));

        let err = presigner_v4()
            .presign(get_object(), options.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PresignExpiration);

        let result = presigner_v1().presign(get_object(), options).await?;
        assert!(result.url.contains("Signature="));
        Ok(())
    }

    #[tokio::test]
    async fn test_presign_upload_part() -> anyhow::Result<()> {
        let request = PresignRequest::UploadPart {
            bucket: "b".to_string(),
            key: "k".to_string(),
            part_number: 2,
            upload_id: "upload".to_string(),
        };
        let result = presigner_v1()
            .presign(request, PresignOptions::default())
            .await?;

        assert_eq!(result.method, Method::PUT);
        assert!(result.url.contains("partNumber=2"));
        assert!(result.url.contains("uploadId=upload"));
        Ok(())
    }

    #[tokio::test]
    async fn test_presign_initiate_multipart_upload() -> anyhow::Result<()> {
        let request = PresignRequest::InitiateMultipartUpload {
            bucket: "b".to_string(),
            key: "k".to_string(),
        };
        let result = presigner_v1()
            .presign(request, PresignOptions::default())
            .await?;

        assert_eq!(result.method, Method::POST);
        assert!(result.url.contains("uploads"));
        Ok(())
    }

    #[tokio::test]
    async fn test_presign_rejects_missing_fields() {
        let request = PresignRequest::GetObject {
            bucket: String::new(),
            key: "k".to_string(),
            version_id: None,
        };
        let err = presigner_v1()
            .presign(request, PresignOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParam);

        let request = PresignRequest::UploadPart {
            bucket: "b".to_string(),
            key: "k".to_string(),
            part_number: 0,
            upload_id: "upload".to_string(),
        };
        let err = presigner_v1()
            .presign(request, PresignOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidParam);
    }

    #[derive(Debug)]
    struct NoneProvider;

    #[async_trait]
    impl crate::ProvideCredential for NoneProvider {
        async fn provide_credential(&self) -> crate::Result<Option<crate::Credential>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_presign_without_credentials() {
        let presigner = Presigner::new(
            "oss-cn-hangzhou.aliyuncs.com",
            "cn-hangzhou",
            SignerV1::new(),
            NoneProvider,
        );
        let err = presigner
            .presign(get_object(), PresignOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyCredentials);
    }

    #[tokio::test]
    async fn test_presign_key_is_percent_encoded() -> anyhow::Result<()> {
        let request = PresignRequest::GetObject {
            bucket: "b".to_string(),
            key: "dir/a file.txt".to_string(),
            version_id: None,
        };
        let result = presigner_v1()
            .presign(request, PresignOptions::default())
            .await?;

        assert!(result
            .url
            .starts_with("https://b.oss-cn-hangzhou.aliyuncs.com/dir/a%20file.txt?"));
        Ok(())
    }
}
