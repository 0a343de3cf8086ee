use std::fmt;

use super::{read_token_response, AuthError, BearerToken};
use crate::config::OpinumConfig;

/// Resource-owner password grant against the Opinum identity endpoint.
#[derive(Clone)]
pub struct PasswordCredential {
    token_url: String,
    client_id: String,
    client_secret: String,
    username: String,
    password: String,
    scope: String,
}

impl fmt::Debug for PasswordCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordCredential")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("scope", &self.scope)
            .finish()
    }
}

impl PasswordCredential {
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            username: username.into(),
            password: password.into(),
            scope: scope.into(),
        }
    }

    /// Fails when the client secret or password is still unset after `AppConfig::fill_secrets`.
    pub fn from_config(cfg: &OpinumConfig) -> Result<Self, AuthError> {
        let missing = |name: &str| AuthError::Credential(format!("opinum.{name} is not set"));
        Ok(Self::new(
            &cfg.token_url,
            &cfg.client_id,
            cfg.client_secret.as_deref().ok_or_else(|| missing("client_secret"))?,
            &cfg.username,
            cfg.password.as_deref().ok_or_else(|| missing("password"))?,
            &cfg.scope,
        ))
    }

    pub async fn acquire(&self, http: &reqwest::Client) -> Result<BearerToken, AuthError> {
        let params = [
            ("grant_type", "password"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("scope", self.scope.as_str()),
        ];

        tracing::debug!(token_url = %self.token_url, "requesting Opinum token");
        let response = http.post(&self.token_url).form(&params).send().await?;
        read_token_response(response).await
    }
}
