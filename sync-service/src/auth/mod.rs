//! Run-scoped bearer tokens for Fluvius (source) and Opinum (sink).

use std::fmt;

use crate::pipeline::{PipelineError, TokenKind, TokenProvider};

pub mod certificate;
pub mod password;

pub use certificate::CertificateCredential;
pub use password::PasswordCredential;

/// Opaque access token. The [`Debug`] impl never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken([REDACTED])")
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("invalid credential material: {0}")]
    Credential(String),
    #[error("token endpoint returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("token response carries no access_token")]
    MissingAccessToken,
    #[error("token request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Reads an OAuth token response, treating any non-success status as a rejection.
async fn read_token_response(response: reqwest::Response) -> Result<BearerToken, AuthError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AuthError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    let parsed: TokenResponse = response.json().await?;
    parsed
        .access_token
        .filter(|t| !t.is_empty())
        .map(BearerToken::new)
        .ok_or(AuthError::MissingAccessToken)
}

/// Token provider backed by the two real OAuth exchanges.
pub struct OAuthTokenProvider {
    http: reqwest::Client,
    source: CertificateCredential,
    sink: PasswordCredential,
}

impl OAuthTokenProvider {
    pub fn new(http: reqwest::Client, source: CertificateCredential, sink: PasswordCredential) -> Self {
        Self { http, source, sink }
    }
}

#[async_trait::async_trait]
impl TokenProvider for OAuthTokenProvider {
    async fn source_token(&self) -> Result<BearerToken, PipelineError> {
        let token = self
            .source
            .acquire(&self.http)
            .await
            .map_err(|e| token_failure(TokenKind::Source, e))?;
        tracing::info!("Fluvius token acquired");
        Ok(token)
    }

    async fn sink_token(&self) -> Result<BearerToken, PipelineError> {
        let token = self
            .sink
            .acquire(&self.http)
            .await
            .map_err(|e| token_failure(TokenKind::Sink, e))?;
        tracing::info!("Opinum token acquired");
        Ok(token)
    }
}

fn token_failure(kind: TokenKind, e: AuthError) -> PipelineError {
    tracing::error!(%kind, error = %e, "token acquisition failed");
    PipelineError::TokenAcquisition {
        kind,
        reason: e.to_string(),
    }
}
