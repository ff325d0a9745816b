//! Canonical request form covered by request signatures.
//!
//! Both the client signer and the reference service's verifier hash the
//! same string, so they must agree on it exactly.

use crate::http::{headers, StorageRequest};

/// Authorization scheme name for shared-key signatures.
pub const SHARED_KEY_SCHEME: &str = "SharedKey";

/// Builds the string a shared-key signature is computed over.
///
/// Layout, one field per line: method, content type, date, then the
/// canonical resource `/{account}{path}`. The query string is not covered,
/// so continuation markers and paging parameters can vary per attempt
/// without re-deriving anything but the date.
pub fn string_to_sign(request: &StorageRequest, account: &str) -> String {
    let content_type = request.headers.get(headers::CONTENT_TYPE).unwrap_or_default();
    let date = request.headers.get(headers::DATE).unwrap_or_default();
    format!(
        "{}\n{}\n{}\n/{}{}",
        request.method,
        content_type,
        date,
        account,
        request.url.path()
    )
}

/// Formats an `Authorization` header value.
pub fn authorization_value(account: &str, signature: &str) -> String {
    format!("{SHARED_KEY_SCHEME} {account}:{signature}")
}

/// Splits an `Authorization` header into `(account, signature)`.
///
/// Returns `None` for any other scheme or a malformed value.
pub fn parse_authorization(value: &str) -> Option<(&str, &str)> {
    let rest = value.strip_prefix(SHARED_KEY_SCHEME)?.strip_prefix(' ')?;
    let (account, signature) = rest.split_once(':')?;
    if account.is_empty() || signature.is_empty() {
        return None;
    }
    Some((account, signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use url::Url;

    #[test]
    fn canonical_string_ignores_query() {
        let url = Url::parse("https://acct.table.example.net/people()?$top=5").unwrap();
        let request = StorageRequest::new(HttpMethod::Get, url)
            .with_header(headers::DATE, "Mon, 19 Oct 2026 10:00:00 GMT");
        assert_eq!(
            string_to_sign(&request, "acct"),
            "GET\n\nMon, 19 Oct 2026 10:00:00 GMT\n/acct/people()"
        );
    }

    #[test]
    fn authorization_header_parsing() {
        let value = authorization_value("acct", "c2ln");
        assert_eq!(value, "SharedKey acct:c2ln");
        assert_eq!(parse_authorization(&value), Some(("acct", "c2ln")));
        assert_eq!(parse_authorization("Bearer xyz"), None);
        assert_eq!(parse_authorization("SharedKey acct"), None);
        assert_eq!(parse_authorization("SharedKey :sig"), None);
    }
}
