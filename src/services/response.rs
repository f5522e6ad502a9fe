//! HTTP response building helpers
//!
//! One place that decides how results and errors look on the wire, so
//! every handler formats errors the same way.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::{Response, StatusCode};
use serde::Serialize;

use crate::error::StoreError;

pub type HttpResponse = Response<Full<Bytes>>;

/// Build a JSON response with the given status code
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> HttpResponse {
    let json = serde_json::to_string(body).unwrap_or_else(|_| "{}".to_string());
    let mut response = Response::new(Full::new(Bytes::from(json)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// 200 OK
pub fn ok<T: Serialize>(body: &T) -> HttpResponse {
    json_response(StatusCode::OK, body)
}

/// 201 Created
pub fn created<T: Serialize>(body: &T) -> HttpResponse {
    json_response(StatusCode::CREATED, body)
}

/// 204 No Content
pub fn no_content() -> HttpResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
}

fn error_body(status: StatusCode, message: &str) -> HttpResponse {
    json_response(status, &serde_json::json!({ "error": message }))
}

pub fn not_found(message: &str) -> HttpResponse {
    error_body(StatusCode::NOT_FOUND, message)
}

pub fn method_not_allowed() -> HttpResponse {
    error_body(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
}

/// Map a store error to its status code
pub fn error_status(error: &StoreError) -> StatusCode {
    match error {
        StoreError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        StoreError::NotFound(_) => StatusCode::NOT_FOUND,
        StoreError::AlreadyExists(_) => StatusCode::CONFLICT,
        StoreError::Validation(_) => StatusCode::BAD_REQUEST,
        StoreError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
        StoreError::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
        StoreError::Io(_) | StoreError::Config(_) | StoreError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Convert a StoreError to an HTTP response
pub fn error_response(error: StoreError) -> HttpResponse {
    error_body(error_status(&error), &error.to_string())
}

/// Wrap a service result into an HTTP response
pub fn from_result<T: Serialize>(result: Result<T, StoreError>) -> HttpResponse {
    match result {
        Ok(value) => ok(&value),
        Err(e) => error_response(e),
    }
}

/// 404 when the lookup came back empty
pub fn from_option<T: Serialize>(
    result: Result<Option<T>, StoreError>,
    not_found_msg: &str,
) -> HttpResponse {
    match result {
        Ok(Some(value)) => ok(&value),
        Ok(None) => not_found(not_found_msg),
        Err(e) => error_response(e),
    }
}

/// 201 Created on success
pub fn from_create_result<T: Serialize>(result: Result<T, StoreError>) -> HttpResponse {
    match result {
        Ok(value) => created(&value),
        Err(e) => error_response(e),
    }
}

/// 204 on success
pub fn from_unit_result(result: Result<(), StoreError>) -> HttpResponse {
    match result {
        Ok(()) => no_content(),
        Err(e) => error_response(e),
    }
}
