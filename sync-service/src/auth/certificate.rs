//! Certificate-bound client-credential exchange against the Fluvius identity authority.
//!
//! The client proves possession of its private key with a short-lived RS256
//! assertion whose header carries the certificate thumbprint (`x5t`) and the
//! public certificate (`x5c`).

use std::fmt;

use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;
use time::OffsetDateTime;

use super::{read_token_response, AuthError, BearerToken};
use crate::config::FluviusAuthConfig;

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 600;

#[derive(Serialize)]
struct AssertionClaims<'a> {
    aud: &'a str,
    iss: &'a str,
    sub: &'a str,
    jti: String,
    nbf: i64,
    iat: i64,
    exp: i64,
}

pub struct CertificateCredential {
    client_id: String,
    token_url: String,
    scope: String,
    x5t: String,
    x5c: String,
    key: EncodingKey,
}

impl fmt::Debug for CertificateCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateCredential")
            .field("client_id", &self.client_id)
            .field("token_url", &self.token_url)
            .field("scope", &self.scope)
            .field("x5t", &self.x5t)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl CertificateCredential {
    /// Loads the private key and public certificate from the configured paths.
    pub fn from_config(cfg: &FluviusAuthConfig) -> Result<Self, AuthError> {
        let key_pem = std::fs::read(&cfg.private_key_path).map_err(|e| {
            AuthError::Credential(format!(
                "cannot read private key {}: {e}",
                cfg.private_key_path.display()
            ))
        })?;
        let cert_pem = std::fs::read_to_string(&cfg.certificate_path).map_err(|e| {
            AuthError::Credential(format!(
                "cannot read certificate {}: {e}",
                cfg.certificate_path.display()
            ))
        })?;
        Self::from_pem(
            &cfg.client_id,
            cfg.token_url(),
            &cfg.scope,
            &cfg.certificate_thumbprint,
            &key_pem,
            &cert_pem,
        )
    }

    pub fn from_pem(
        client_id: &str,
        token_url: String,
        scope: &str,
        thumbprint: &str,
        key_pem: &[u8],
        cert_pem: &str,
    ) -> Result<Self, AuthError> {
        let key = EncodingKey::from_rsa_pem(key_pem)
            .map_err(|e| AuthError::Credential(format!("invalid RSA private key: {e}")))?;
        Ok(Self {
            client_id: client_id.to_string(),
            token_url,
            scope: scope.to_string(),
            x5t: thumbprint_to_x5t(thumbprint)?,
            x5c: certificate_body(cert_pem)?,
            key,
        })
    }

    pub async fn acquire(&self, http: &reqwest::Client) -> Result<BearerToken, AuthError> {
        let assertion = self.client_assertion()?;
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("scope", self.scope.as_str()),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", assertion.as_str()),
        ];

        tracing::debug!(token_url = %self.token_url, "requesting Fluvius token");
        let response = http.post(&self.token_url).form(&params).send().await?;
        read_token_response(response).await
    }

    fn client_assertion(&self) -> Result<String, AuthError> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let claims = AssertionClaims {
            aud: &self.token_url,
            iss: &self.client_id,
            sub: &self.client_id,
            jti: uuid::Uuid::new_v4().to_string(),
            nbf: now,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.x5t = Some(self.x5t.clone());
        header.x5c = Some(vec![self.x5c.clone()]);

        encode(&header, &claims, &self.key)
            .map_err(|e| AuthError::Credential(format!("cannot sign client assertion: {e}")))
    }
}

/// Hex SHA-1 thumbprint (colons and whitespace tolerated) to base64url.
fn thumbprint_to_x5t(thumbprint: &str) -> Result<String, AuthError> {
    let cleaned: String = thumbprint
        .chars()
        .filter(|c| *c != ':' && !c.is_whitespace())
        .collect();
    let bytes = hex::decode(&cleaned)
        .map_err(|e| AuthError::Credential(format!("invalid certificate thumbprint: {e}")))?;
    if bytes.is_empty() {
        return Err(AuthError::Credential("empty certificate thumbprint".to_string()));
    }
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Base64 DER body of the first PEM certificate block.
fn certificate_body(cert_pem: &str) -> Result<String, AuthError> {
    let body: String = cert_pem
        .lines()
        .map(str::trim)
        .skip_while(|l| !l.starts_with("-----BEGIN CERTIFICATE"))
        .skip(1)
        .take_while(|l| !l.starts_with("-----END CERTIFICATE"))
        .collect();
    if body.is_empty() || STANDARD.decode(&body).is_err() {
        return Err(AuthError::Credential(
            "public certificate is not a PEM certificate".to_string(),
        ));
    }
    Ok(body)
}
