use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use log::debug;
use once_cell::sync::Lazy;
use reqwest::blocking::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::{
    fmt::{Debug, Formatter, Result as FmtResult},
    str::FromStr,
};
use url::Url;

use crate::{
    error::{Error, Result},
    resources::project::ProjectId,
};

const JWT_BEARER_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const SERVICE_ACCOUNT_KEY_TYPE: &str = "service_account";

/// Scope requested for the access token; dataset management needs nothing wider.
pub const BIGQUERY_SCOPE: &str = "https://www.googleapis.com/auth/bigquery";

static DEFAULT_TOKEN_URI: Lazy<Url> = Lazy::new(|| {
    Url::parse("https://oauth2.googleapis.com/token").expect("Default token URI is well-formed")
});

/// Lifetime of the signed assertion. Google rejects anything above one hour.
const ASSERTION_LIFETIME_SECONDS: i64 = 3600;

#[derive(Clone, PartialEq, Eq)]
pub struct Token(pub String);

impl Debug for Token {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        formatter.write_str("Token(<redacted>)")
    }
}

/// The JSON key file downloaded for a Google Cloud service account.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    #[serde(rename = "type", default)]
    pub key_type: Option<String>,
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    #[serde(default)]
    pub private_key_id: Option<String>,
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: Url,
}

fn default_token_uri() -> Url {
    DEFAULT_TOKEN_URI.clone()
}

impl Debug for ServiceAccountKey {
    fn fmt(&self, formatter: &mut Formatter) -> FmtResult {
        formatter
            .debug_struct("ServiceAccountKey")
            .field("project_id", &self.project_id)
            .field("private_key_id", &self.private_key_id)
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri.as_str())
            .finish_non_exhaustive()
    }
}

impl FromStr for ServiceAccountKey {
    type Err = Error;

    fn from_str(string: &str) -> Result<Self> {
        let key: ServiceAccountKey =
            serde_json::from_str(string).map_err(|error| Error::BadCredentials {
                message: error.to_string(),
            })?;

        match key.key_type.as_deref() {
            None | Some(SERVICE_ACCOUNT_KEY_TYPE) => {}
            Some(other) => {
                return Err(Error::BadCredentials {
                    message: format!("expected a `{SERVICE_ACCOUNT_KEY_TYPE}` key, got `{other}`"),
                })
            }
        }
        if key.client_email.is_empty() {
            return Err(Error::BadCredentials {
                message: "`client_email` is empty".to_owned(),
            });
        }
        Ok(key)
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

impl ServiceAccountKey {
    /// Build the RS256-signed JWT that is exchanged for an access token.
    pub(crate) fn sign_assertion(&self, scope: &str, now: DateTime<Utc>) -> Result<String> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.private_key_id.clone();

        let claims = Claims {
            iss: &self.client_email,
            scope,
            aud: self.token_uri.as_str(),
            iat: now.timestamp(),
            exp: assertion_expiry(now).timestamp(),
        };

        let encoding_key = EncodingKey::from_rsa_pem(self.private_key.as_bytes()).map_err(|_| {
            Error::BadCredentials {
                message: "`private_key` is not a PEM encoded RSA key".to_owned(),
            }
        })?;
        encode(&header, &claims, &encoding_key).map_err(Error::SignAssertion)
    }

    /// Exchange a signed assertion for a bearer token at `token_uri`.
    pub(crate) fn fetch_token(&self, http_client: &HttpClient, scope: &str) -> Result<Token> {
        let assertion = self.sign_assertion(scope, Utc::now())?;

        debug!(
            "Attempting POST `{}` for `{}`",
            self.token_uri, self.client_email
        );
        let http_response = http_client
            .post(self.token_uri.clone())
            .form(&[
                ("grant_type", JWT_BEARER_GRANT_TYPE),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .map_err(|source| Error::ReqwestError {
                source,
                message: "Token exchange request failed.".to_owned(),
            })?;

        let status_code = http_response.status();
        if !status_code.is_success() {
            let body = http_response.text().unwrap_or_default();
            let message = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(TokenErrorResponse {
                    error,
                    error_description: Some(description),
                }) => format!("{error}: {description}"),
                Ok(TokenErrorResponse { error, .. }) => error,
                Err(_) => body,
            };
            return Err(Error::TokenExchange {
                status_code,
                message,
            });
        }

        let response = http_response
            .json::<TokenResponse>()
            .map_err(Error::BadJsonResponse)?;
        Ok(Token(response.access_token))
    }
}

/// Lifetime granted to assertions signed at `now`.
pub(crate) fn assertion_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::seconds(ASSERTION_LIFETIME_SECONDS)
}
