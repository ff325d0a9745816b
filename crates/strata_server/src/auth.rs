//! Shared-key signature verification.
//!
//! The verifier recomputes HMAC-SHA256 over the canonical request string
//! and compares it with the signature in the `Authorization` header. The
//! comparison goes through [`Mac::verify_slice`], which is constant time.

use crate::error::{ServerError, ServerResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use strata_protocol::signing::{parse_authorization, string_to_sign};
use strata_protocol::{headers, StorageRequest};

type HmacSha256 = Hmac<Sha256>;

/// Checks request signatures for one account.
#[derive(Clone)]
pub struct SignatureVerifier {
    account: String,
    key: Vec<u8>,
}

impl SignatureVerifier {
    /// Creates a verifier for `account` with its raw key bytes.
    pub fn new(account: impl Into<String>, key: Vec<u8>) -> Self {
        Self {
            account: account.into(),
            key,
        }
    }

    /// Verifies the request's `Authorization` header.
    pub fn verify(&self, request: &StorageRequest) -> ServerResult<()> {
        let header = request
            .headers
            .get(headers::AUTHORIZATION)
            .ok_or_else(|| ServerError::AuthenticationFailed("missing Authorization".into()))?;
        if !request.headers.contains(headers::DATE) {
            return Err(ServerError::AuthenticationFailed(format!(
                "missing {}",
                headers::DATE
            )));
        }
        let (account, signature) = parse_authorization(header).ok_or_else(|| {
            ServerError::AuthenticationFailed("malformed Authorization".into())
        })?;
        if account != self.account {
            return Err(ServerError::AuthenticationFailed(format!(
                "unknown account {account:?}"
            )));
        }
        let signature = STANDARD
            .decode(signature)
            .map_err(|_| ServerError::AuthenticationFailed("signature is not base64".into()))?;

        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        mac.update(string_to_sign(request, &self.account).as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| ServerError::AuthenticationFailed("signature mismatch".into()))
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_protocol::signing::authorization_value;
    use strata_protocol::HttpMethod;
    use url::Url;

    const KEY: &[u8] = b"test-secret-key-32-bytes-long!!";

    fn request() -> StorageRequest {
        StorageRequest::new(
            HttpMethod::Get,
            Url::parse("https://acct.table.example.net/people()?$top=5").unwrap(),
        )
        .with_header(headers::DATE, "Mon, 19 Oct 2026 10:00:00 GMT")
    }

    fn sign(request: StorageRequest, account: &str, key: &[u8]) -> StorageRequest {
        let mut mac = HmacSha256::new_from_slice(key).unwrap();
        mac.update(string_to_sign(&request, account).as_bytes());
        let signature = STANDARD.encode(mac.finalize().into_bytes());
        request.with_header(headers::AUTHORIZATION, authorization_value(account, &signature))
    }

    #[test]
    fn accepts_valid_signature() {
        let verifier = SignatureVerifier::new("acct", KEY.to_vec());
        assert!(verifier.verify(&sign(request(), "acct", KEY)).is_ok());
    }

    #[test]
    fn rejects_missing_header() {
        let verifier = SignatureVerifier::new("acct", KEY.to_vec());
        let err = verifier.verify(&request()).unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn rejects_wrong_key() {
        let verifier = SignatureVerifier::new("acct", KEY.to_vec());
        let signed = sign(request(), "acct", b"another-key");
        assert!(verifier.verify(&signed).is_err());
    }

    #[test]
    fn rejects_wrong_account() {
        let verifier = SignatureVerifier::new("acct", KEY.to_vec());
        let signed = sign(request(), "other", KEY);
        assert!(verifier.verify(&signed).is_err());
    }

    #[test]
    fn rejects_tampered_request() {
        let verifier = SignatureVerifier::new("acct", KEY.to_vec());
        let mut signed = sign(request(), "acct", KEY);
        signed.url.set_path("/secrets()");
        assert!(verifier.verify(&signed).is_err());
    }

    #[test]
    fn query_changes_keep_signature_valid() {
        let verifier = SignatureVerifier::new("acct", KEY.to_vec());
        let mut signed = sign(request(), "acct", KEY);
        signed.url.set_query(Some("$top=10&NextPartitionKey=p"));
        assert!(verifier.verify(&signed).is_ok());
    }
}
