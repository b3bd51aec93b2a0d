//! Request signing and presigned URL authorization for OSS-style object
//! storage services.
//!
//! The crate is built around three pieces:
//!
//! - [`Credential`] and [`ProvideCredential`]: who is signing.
//! - [`Sign`] with its two implementations [`SignerV1`] (legacy
//!   HMAC-SHA1 scheme) and [`SignerV4`] (date/region scoped HMAC-SHA256
//!   scheme): how a request gets signed, either into headers or into the
//!   query string.
//! - [`Presigner`]: turns a typed operation like
//!   [`PresignRequest::GetObject`] into a self-contained presigned URL by
//!   signing a throwaway request in query mode.
//!
//! ```no_run
//! use oss_auth::{Presigner, PresignOptions, PresignRequest};
//! use oss_auth::{SignerV1, StaticCredentialProvider};
//!
//! # async fn example() -> oss_auth::Result<()> {
//! let presigner = Presigner::new(
//!     "oss-cn-hangzhou.aliyuncs.com",
//!     "cn-hangzhou",
//!     SignerV1::new(),
//!     StaticCredentialProvider::new("access_key_id", "access_key_secret"),
//! );
//!
//! let result = presigner
//!     .presign(
//!         PresignRequest::GetObject {
//!             bucket: "my-bucket".to_string(),
//!             key: "path/to/object".to_string(),
//!             version_id: None,
//!         },
//!         PresignOptions::default(),
//!     )
//!     .await?;
//!
//! println!("{} {}", result.method, result.url);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod constants;
mod context;
mod credential;
mod error;
pub mod hash;
mod presign;
mod signer;
pub mod time;
mod transport;
mod utils;
mod v1;
mod v4;

pub use context::SigningContext;
pub use credential::Credential;
pub use credential::ProvideCredential;
pub use credential::StaticCredentialProvider;
pub use error::Error;
pub use error::ErrorKind;
pub use error::Result;
pub use presign::PresignOptions;
pub use presign::PresignRequest;
pub use presign::PresignResult;
pub use presign::Presigner;
pub use signer::Sign;
pub use transport::HttpSend;
pub use transport::NullHttpSend;
pub use v1::SignerV1;
pub use v4::SignerV4;
