//! Request signing.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use strata_protocol::signing::{authorization_value, string_to_sign};
use strata_protocol::{headers, StorageRequest};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Signing failures. All of them are configuration problems.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SigningError {
    /// The account key could not be used.
    #[error("invalid account key: {0}")]
    InvalidKey(String),

    /// The request lacks a header the signature must cover.
    #[error("request is missing the {0} header")]
    MissingHeader(&'static str),
}

/// Adds credentials to a fully built request.
pub trait RequestSigner: Send + Sync {
    /// Signs `request` in place.
    fn sign(&self, request: &mut StorageRequest) -> Result<(), SigningError>;
}

/// Leaves requests unsigned.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnonymousSigner;

impl RequestSigner for AnonymousSigner {
    fn sign(&self, _request: &mut StorageRequest) -> Result<(), SigningError> {
        Ok(())
    }
}

/// HMAC-SHA256 shared-key signer.
#[derive(Clone)]
pub struct SharedKeySigner {
    account: String,
    key: Vec<u8>,
}

impl SharedKeySigner {
    /// Creates a signer from a base64-encoded account key.
    pub fn new(account: impl Into<String>, base64_key: &str) -> Result<Self, SigningError> {
        let key = STANDARD
            .decode(base64_key)
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        Self::from_bytes(account, key)
    }

    /// Creates a signer from raw key bytes.
    pub fn from_bytes(account: impl Into<String>, key: Vec<u8>) -> Result<Self, SigningError> {
        if key.is_empty() {
            return Err(SigningError::InvalidKey("key is empty".into()));
        }
        Ok(Self {
            account: account.into(),
            key,
        })
    }

    /// Account name placed in the authorization header.
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Computes the base64 signature of `request`.
    pub fn signature(&self, request: &StorageRequest) -> Result<String, SigningError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| SigningError::InvalidKey(e.to_string()))?;
        mac.update(string_to_sign(request, &self.account).as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }
}

impl std::fmt::Debug for SharedKeySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedKeySigner")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

impl RequestSigner for SharedKeySigner {
    fn sign(&self, request: &mut StorageRequest) -> Result<(), SigningError> {
        if !request.headers.contains(headers::DATE) {
            return Err(SigningError::MissingHeader(headers::DATE));
        }
        let signature = self.signature(request)?;
        request.headers.insert(
            headers::AUTHORIZATION,
            authorization_value(&self.account, &signature),
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_protocol::HttpMethod;
    use url::Url;

    fn request() -> StorageRequest {
        StorageRequest::new(
            HttpMethod::Get,
            Url::parse("https://acct.table.example.net/people()").unwrap(),
        )
        .with_header(headers::DATE, "Mon, 19 Oct 2026 10:00:00 GMT")
    }

    #[test]
    fn shared_key_sets_authorization() {
        let signer = SharedKeySigner::from_bytes("acct", b"secret".to_vec()).unwrap();
        let mut req = request();
        signer.sign(&mut req).unwrap();
        let header = req.headers.get(headers::AUTHORIZATION).unwrap();
        assert!(header.starts_with("SharedKey acct:"));
        assert_eq!(
            header,
            authorization_value("acct", &signer.signature(&req).unwrap())
        );
    }

    #[test]
    fn invalid_keys_are_rejected() {
        assert!(matches!(
            SharedKeySigner::new("acct", "not base64!"),
            Err(SigningError::InvalidKey(_))
        ));
        assert!(SharedKeySigner::from_bytes("acct", Vec::new()).is_err());
    }

    #[test]
    fn missing_date_is_a_signing_failure() {
        let signer = SharedKeySigner::from_bytes("acct", b"secret".to_vec()).unwrap();
        let mut req = StorageRequest::new(
            HttpMethod::Get,
            Url::parse("https://acct.table.example.net/people()").unwrap(),
        );
        assert_eq!(
            signer.sign(&mut req),
            Err(SigningError::MissingHeader(headers::DATE))
        );
    }

    #[test]
    fn anonymous_signer_is_a_no_op() {
        let mut req = request();
        AnonymousSigner.sign(&mut req).unwrap();
        assert!(!req.headers.contains(headers::AUTHORIZATION));
    }

    #[test]
    fn debug_hides_key() {
        let signer = SharedKeySigner::from_bytes("acct", b"secret".to_vec()).unwrap();
        assert!(!format!("{signer:?}").contains("secret"));
    }
}
