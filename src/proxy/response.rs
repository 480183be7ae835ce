//! Shared HTTP response helpers

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Empty, Full};
use hyper::{Response, StatusCode};

/// Body type for responses written to the client.
pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

/// Wrap buffered bytes as a response body.
pub fn full_body(bytes: Bytes) -> ProxyBody {
    Full::new(bytes).map_err(|e| match e {}).boxed()
}

/// An empty response body.
pub fn empty_body() -> ProxyBody {
    Empty::<Bytes>::new().map_err(|e| match e {}).boxed()
}

/// 502 Bad Gateway for upstream dial/request/read failures, with the
/// error text in the body as a diagnostic.
pub fn upstream_error_response(message: &str) -> Response<ProxyBody> {
    let body = format!("Proxy error: {}\n", message);

    Response::builder()
        .status(StatusCode::BAD_GATEWAY)
        .header("Content-Type", "text/plain")
        .body(full_body(Bytes::from(body)))
        .unwrap()
}

/// 500 Internal Server Error for a panicking handler.
pub fn internal_error_response() -> Response<ProxyBody> {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header("Content-Type", "text/plain")
        .body(full_body(Bytes::from_static(b"Internal proxy error\n")))
        .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_report;

    #[test]
    fn test_upstream_error_response() {
        let t = test_report!("Upstream failures map to 502 with detail");
        let resp = upstream_error_response("dial timeout");
        t.assert_eq("status", &resp.status(), &StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_internal_error_response() {
        let t = test_report!("Panics map to 500");
        let resp = internal_error_response();
        t.assert_eq("status", &resp.status(), &StatusCode::INTERNAL_SERVER_ERROR);
    }
}
