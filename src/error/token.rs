use oauth2::basic::BasicErrorResponseType;
use oauth2::reqwest::Error as ReqwestClientError;
use oauth2::{HttpClientError, RequestTokenError, StandardErrorResponse};
use reqwest::StatusCode;
use thiserror::Error as ThisError;

use super::IsRetryable;

#[derive(Debug, ThisError)]
pub enum TokenError {
    #[error("token source has no credential configured for this connection")]
    NoCredential,

    #[error("OAuth2 request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("OAuth2 upstream error with status: {0}")]
    UpstreamStatus(StatusCode),

    #[error("OAuth2 server response error: {error}")]
    ServerResponse { error: String },

    #[error("OAuth2 token endpoint parse error: {message}. Body: {body}")]
    Parse { message: String, body: String },

    #[error("token refresh unexpected error: {0}")]
    Other(String),

    #[error("database error while persisting refreshed credential: {0}")]
    Database(#[from] sqlx::Error),

    #[error("token manager RPC failed: {0}")]
    Ractor(String),

    #[error("refresh_on_unauthorized called on a token source that does not support refresh")]
    RefreshUnsupported,
}

impl IsRetryable for TokenError {
    fn is_retryable(&self) -> bool {
        match self {
            TokenError::Request(_) => true,
            TokenError::UpstreamStatus(status) => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            TokenError::Parse { .. } => true,
            TokenError::ServerResponse { .. }
            | TokenError::NoCredential
            | TokenError::Other(_)
            | TokenError::Database(_)
            | TokenError::Ractor(_)
            | TokenError::RefreshUnsupported => false,
        }
    }
}

type OauthRequestTokenError = RequestTokenError<
    HttpClientError<ReqwestClientError>,
    StandardErrorResponse<BasicErrorResponseType>,
>;

impl From<OauthRequestTokenError> for TokenError {
    fn from(e: OauthRequestTokenError) -> Self {
        match e {
            RequestTokenError::ServerResponse(err) => TokenError::ServerResponse {
                error: err.error().to_string(),
            },
            RequestTokenError::Request(wrapper) => match wrapper {
                HttpClientError::Reqwest(real_err) => TokenError::Request(*real_err),
                other => TokenError::Other(format!("HttpClientError: {other:?}")),
            },
            RequestTokenError::Parse(parse_err, body) => {
                let body_str = String::from_utf8_lossy(&body);
                let body = body_str
                    .char_indices()
                    .nth(200)
                    .map(|(idx, _)| format!("{}...<truncated>", &body_str[..idx]))
                    .unwrap_or_else(|| body_str.into_owned());
                TokenError::Parse {
                    message: parse_err.to_string(),
                    body,
                }
            }
            RequestTokenError::Other(s) => TokenError::Other(s),
        }
    }
}
