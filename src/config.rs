//! Relay configuration, built from environment variables once at startup.

use secrecy::SecretString;

use crate::error::ConfigError;

/// All runtime settings. Read once in `main`; immutable for the process
/// lifetime.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Base URL of the messaging backend (signal-cli-rest-api style).
    pub backend_base: String,
    /// The registered number the relay sends and receives as.
    pub number: String,
    /// Bearer token callers must present on `POST /notify`.
    pub gateway_token: SecretString,
    /// Downstream inbox endpoint for normalized inbound messages.
    pub inbox_url: String,
    /// Bearer token for the inbox endpoint. Defaults to the gateway token.
    pub inbox_token: SecretString,
    /// Server-side long-poll window passed to the backend, in seconds.
    pub receive_timeout_secs: u64,
    /// Senders allowed to be forwarded. Empty means allow all.
    pub allow_senders: Vec<String>,
    /// Whether the inbound forwarder runs at all.
    pub forward_enabled: bool,
    /// Address the HTTP front binds to.
    pub bind_addr: String,
}

impl RelayConfig {
    /// Build config from environment variables.
    ///
    /// `SIGNAL_NUMBER` and `GATEWAY_TOKEN` are required; everything else
    /// has a default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let backend_base =
            lookup("SIGNAL_API_BASE").unwrap_or_else(|| "http://signal-api:8080".to_string());

        let number = lookup("SIGNAL_NUMBER")
            .ok_or_else(|| ConfigError::MissingEnvVar("SIGNAL_NUMBER".to_string()))?;

        let gateway_token = lookup("GATEWAY_TOKEN")
            .ok_or_else(|| ConfigError::MissingEnvVar("GATEWAY_TOKEN".to_string()))?;

        let inbox_url =
            lookup("INBOX_URL").unwrap_or_else(|| "http://assistant-core:8088/inbox".to_string());

        let inbox_token = lookup("INBOX_TOKEN").unwrap_or_else(|| gateway_token.clone());

        let receive_timeout_secs: u64 = match lookup("RECEIVE_TIMEOUT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "RECEIVE_TIMEOUT".to_string(),
                message: format!("not a number of seconds: {raw:?}"),
            })?,
            None => 60,
        };

        let allow_senders: Vec<String> = lookup("ALLOW_SENDERS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let forward_enabled = lookup("ENABLE_FORWARD")
            .map(|v| parse_bool(&v))
            .unwrap_or(true);

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string());

        Ok(Self {
            backend_base,
            number,
            gateway_token: SecretString::from(gateway_token),
            inbox_url,
            inbox_token: SecretString::from(inbox_token),
            receive_timeout_secs,
            allow_senders,
            forward_enabled,
            bind_addr,
        })
    }
}

/// Truthy strings: `1`, `true`, `yes` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
