use reqwest::StatusCode;
use url::Url;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("API request failed with {}: {}", status_code, message)]
    Api {
        status_code: StatusCode,
        message: String,
    },

    #[error("Invalid endpoint `{}`", endpoint)]
    BadEndpoint { endpoint: Url },

    #[error("Bad token: {}", token)]
    BadToken { token: String },

    #[error("Invalid service account credentials: {}", message)]
    BadCredentials { message: String },

    #[error("Could not sign the service account assertion")]
    SignAssertion(#[source] jsonwebtoken::errors::Error),

    #[error("Token exchange failed with {}: {}", status_code, message)]
    TokenExchange {
        status_code: StatusCode,
        message: String,
    },

    #[error("Invalid project id: {}", identifier)]
    BadProjectId { identifier: String },

    #[error("Expected a dataset name or <project>.<dataset>, got: {}", identifier)]
    BadDatasetName { identifier: String },

    #[error("Could not parse JSON response.")]
    BadJsonResponse(#[source] reqwest::Error),

    #[error("Failed to initialise the HTTP client")]
    BuildHttpClient(#[source] reqwest::Error),

    #[error("HTTP request error: {}", message)]
    ReqwestError {
        message: String,
        source: reqwest::Error,
    },
}

impl Error {
    /// The HTTP status returned by the warehouse, if the request got that far.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Error::Api { status_code, .. } | Error::TokenExchange { status_code, .. } => {
                Some(*status_code)
            }
            _ => None,
        }
    }
}
