use std::collections::HashSet;

use once_cell::sync::Lazy;
use percent_encoding::AsciiSet;
use percent_encoding::NON_ALPHANUMERIC;

// Headers and query parameters used by the legacy scheme.
pub const CONTENT_MD5: &str = "content-md5";
pub const HEADER_SECURITY_TOKEN: &str = "security-token";
pub const QUERY_ACCESS_KEY_ID: &str = "OSSAccessKeyId";
pub const QUERY_EXPIRES: &str = "Expires";
pub const QUERY_SIGNATURE: &str = "Signature";
pub const QUERY_SECURITY_TOKEN: &str = "security-token";

// The date/region scoped scheme.
pub const V4_ALGORITHM: &str = "OSS4-HMAC-SHA256";
pub const V4_REQUEST: &str = "aliyun_v4_request";
pub const V4_SECRET_PREFIX: &str = "aliyun_v4";
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// Default product used to derive the `x-{product}-` header prefix.
pub const DEFAULT_PRODUCT: &str = "oss";

/// Default presigned URL lifetime.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 15 * 60;

/// Maximum presigned URL lifetime for the date/region scoped scheme.
pub const V4_MAX_EXPIRES_IN_SECS: u64 = 7 * 24 * 3600;

/// AsciiSet for encoding URI path segments.
///
/// Encode every byte except the unreserved characters `A-Z a-z 0-9 - . _ ~`
/// and the path separator `/`.
pub static URI_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// AsciiSet for encoding query keys and values.
///
/// Same as [`URI_ENCODE_SET`] but `/` is encoded too.
pub static QUERY_ENCODE_SET: AsciiSet = NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

pub fn is_sub_resource(key: &str) -> bool {
    SUB_RESOURCES.contains(key)
}

/// Query parameters that change which action a request performs on a
/// resource, and therefore participate in the legacy canonicalization.
static SUB_RESOURCES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "acl",
        "uploads",
        "location",
        "cors",
        "logging",
        "website",
        "referer",
        "lifecycle",
        "delete",
        "append",
        "tagging",
        "objectMeta",
        "uploadId",
        "partNumber",
        "security-token",
        "position",
        "img",
        "style",
        "styleName",
        "replication",
        "replicationProgress",
        "replicationLocation",
        "cname",
        "bucketInfo",
        "comp",
        "qos",
        "live",
        "status",
        "vod",
        "startTime",
        "endTime",
        "symlink",
        "x-oss-process",
        "response-content-type",
        "x-oss-traffic-limit",
        "response-content-language",
        "response-expires",
        "response-cache-control",
        "response-content-disposition",
        "response-content-encoding",
        "udf",
        "udfName",
        "udfImage",
        "udfId",
        "udfImageDesc",
        "udfApplication",
        "udfApplicationLog",
        "restore",
        "callback",
        "callback-var",
        "qosInfo",
        "policy",
        "stat",
        "encryption",
        "versions",
        "versioning",
        "versionId",
        "requestPayment",
        "x-oss-request-payer",
        "sequential",
        "inventory",
        "inventoryId",
        "continuation-token",
        "asyncFetch",
        "worm",
        "wormId",
        "wormExtend",
        "withHashContext",
        "x-oss-enable-md5",
        "x-oss-enable-sha1",
        "x-oss-enable-sha256",
        "x-oss-hash-ctx",
        "x-oss-md5-ctx",
        "transferAcceleration",
        "regionList",
        "cloudboxes",
        "x-oss-ac-source-ip",
        "x-oss-ac-subnet-mask",
        "x-oss-ac-vpc-id",
        "x-oss-ac-forward-allow",
        "metaQuery",
    ])
});
