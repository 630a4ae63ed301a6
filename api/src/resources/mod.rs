pub mod dataset;
pub mod project;

use crate::error::Error;
use reqwest::{blocking::Response as HttpResponse, StatusCode};
use serde::Deserialize;

/// Error payload returned by Google APIs for non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl ErrorResponse {
    fn into_error(self, status_code: StatusCode) -> Error {
        let message = match (self.error.status, self.error.message) {
            (Some(status), Some(message)) => format!("{status}: {message}"),
            (None, Some(message)) => message,
            (Some(status), None) => status,
            (None, None) => String::new(),
        };
        Error::Api {
            status_code,
            message,
        }
    }
}

/// Consume an unsuccessful response, keeping the API's own message when it sent one.
pub(crate) fn api_error(http_response: HttpResponse) -> Error {
    let status_code = http_response.status();
    let body = http_response.text().unwrap_or_default();
    match serde_json::from_str::<ErrorResponse>(&body) {
        Ok(response) => response.into_error(status_code),
        Err(_) => Error::Api {
            status_code,
            message: body,
        },
    }
}
