//! Rendering of rate limit errors as HTTP responses.

use axum::body::Body;
use http::{HeaderValue, Response, header};
use rate_limit::HttpError;
use serde::Serialize;

const INTERNAL_MESSAGE: &str = "An internal server error occurred";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorResponse<'a> {
    status_code: u16,
    error: &'a str,
    message: &'a str,
}

impl ErrorResponse<'_> {
    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"error":"Internal Server Error"}"#.to_string())
    }
}

/// Turns an error into a JSON response carrying the headers of the error.
///
/// Messages of server errors stay in the logs; clients get a generic one.
pub(crate) fn into_response(error: HttpError) -> Response<Body> {
    let (status, message, headers) = error.into_parts();

    let message = if status.is_server_error() {
        log::error!("Rate limiting failed with {status}: {message}");
        INTERNAL_MESSAGE
    } else {
        message.as_str()
    };

    let body = ErrorResponse {
        status_code: status.as_u16(),
        error: status.canonical_reason().unwrap_or("Unknown"),
        message,
    };

    let mut response = Response::new(Body::from(body.to_json()));
    *response.status_mut() = status;

    let response_headers = response.headers_mut();
    response_headers.extend(headers);
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

    response
}
