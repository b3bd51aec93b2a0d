use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

use crate::Result;

/// HttpSend is the transport abstraction the dispatch layer satisfies.
///
/// The presign orchestrator routes requests through this trait so that the
/// presign path and the real dispatch path stay structurally identical; only
/// the implementation differs.
#[async_trait]
pub trait HttpSend: Debug + Send + Sync + 'static {
    /// Send the request and return the response.
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>>;
}

/// NullHttpSend never touches the network: it echoes the request body back
/// with status `200 OK`, synchronously.
///
/// This is the transport presigning runs through, so a presign call exercises
/// the full dispatch shape without any I/O.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullHttpSend;

#[async_trait]
impl HttpSend for NullHttpSend {
    async fn http_send(&self, req: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let (_, body) = req.into_parts();
        Ok(http::Response::builder()
            .status(http::StatusCode::OK)
            .body(body)?)
    }
}
