use bytes::Bytes;
use common::errors::ConvoscopeError;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Empty, Full};
use hyper::{Response, StatusCode};
use serde::Serialize;

pub type HandlerResponse = Response<BoxBody<Bytes, hyper::Error>>;

pub fn full<T: Into<Bytes>>(chunk: T) -> BoxBody<Bytes, hyper::Error> {
    Full::new(chunk.into())
        .map_err(|never| match never {})
        .boxed()
}

pub fn empty() -> BoxBody<Bytes, hyper::Error> {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed()
}

/// Serialize `value` as the JSON body of a response with `status`
pub fn json_response<T: Serialize>(status: StatusCode, value: &T) -> HandlerResponse {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            return ConvoscopeError::InternalServerError(format!(
                "failed to serialize response: {}",
                e
            ))
            .into_response()
        }
    };

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(full(json))
        .unwrap_or_else(|e| ConvoscopeError::from(e).into_response())
}
