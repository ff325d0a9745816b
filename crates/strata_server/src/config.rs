//! Server configuration.

use strata_protocol::{PayloadFormat, SERVER_MAX_PAGE_SIZE};

/// Configuration for the reference table service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Account name the service answers for.
    pub account: String,
    /// Largest page returned for one query request.
    pub max_page_size: u32,
    /// Format used when the request does not say.
    pub default_format: PayloadFormat,
    /// Whether to require shared-key signatures.
    pub require_auth: bool,
    /// Account key for signature checks (if auth enabled).
    pub account_key: Option<Vec<u8>>,
}

impl ServerConfig {
    /// Creates a configuration for `account`.
    pub fn new(account: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            max_page_size: SERVER_MAX_PAGE_SIZE,
            default_format: PayloadFormat::Json,
            require_auth: false,
            account_key: None,
        }
    }

    /// Sets the server page size.
    pub fn with_max_page_size(mut self, size: u32) -> Self {
        self.max_page_size = size.max(1);
        self
    }

    /// Sets the fallback payload format.
    pub fn with_default_format(mut self, format: PayloadFormat) -> Self {
        self.default_format = format;
        self
    }

    /// Enables signature checks with the given account key.
    pub fn with_auth(mut self, key: Vec<u8>) -> Self {
        self.require_auth = true;
        self.account_key = Some(key);
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new("devstoreaccount")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_page_size, 1000);
        assert!(!config.require_auth);
        assert_eq!(config.default_format, PayloadFormat::Json);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new("acct")
            .with_max_page_size(0)
            .with_default_format(PayloadFormat::Cbor)
            .with_auth(vec![1, 2, 3, 4]);

        assert_eq!(config.account, "acct");
        assert_eq!(config.max_page_size, 1);
        assert!(config.require_auth);
        assert_eq!(config.account_key, Some(vec![1, 2, 3, 4]));
    }
}
