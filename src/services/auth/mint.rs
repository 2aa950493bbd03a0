use jsonwebtoken::{Algorithm, EncodingKey, Header};
use tracing::warn;

use crate::services::auth::claims::{self, ClaimsError, DecodedClaims};

#[derive(Debug, thiserror::Error)]
pub enum MintError {
    #[error(transparent)]
    Claims(#[from] ClaimsError),
    #[error("failed to sign token: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),
    #[error("invalid signing key: {0}")]
    Key(String),
}

/// Signs compact claims. Used by the `mint-token` binary and by tests; the
/// server itself never issues tokens.
#[derive(Clone)]
pub struct TokenMinter {
    encoding_key: EncodingKey,
    algorithm: Algorithm,
    kid: Option<String>,
}

impl TokenMinter {
    pub fn hs256(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            algorithm: Algorithm::HS256,
            kid: None,
        }
    }

    /// `private_key_pem` must be an Ed25519 private key in PKCS#8 PEM format.
    pub fn ed25519(private_key_pem: &str) -> Result<Self, MintError> {
        let encoding_key = EncodingKey::from_ed_pem(private_key_pem.as_bytes()).map_err(|e| {
            warn!(error = %e, "failed to parse signing key PEM (expected Ed25519 PKCS#8 PEM)");
            MintError::Key(e.to_string())
        })?;
        Ok(Self {
            encoding_key,
            algorithm: Algorithm::EdDSA,
            kid: None,
        })
    }

    pub fn with_kid(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn mint(&self, claims: &DecodedClaims) -> Result<String, MintError> {
        let payload = claims::encode_claims(claims)?;
        let mut header = Header::new(self.algorithm);
        header.typ = Some("JWT".to_string());
        header.kid = self.kid.clone();
        Ok(jsonwebtoken::encode(&header, &payload, &self.encoding_key)?)
    }
}
