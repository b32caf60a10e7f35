use thiserror::Error;

/// Unified error type for the prober
#[derive(Error, Debug)]
pub enum ProxyProbeError {
    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid proxy entry: {0}")]
    InvalidProxy(String),

    // Transport errors
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Proxy setup failed: {0}")]
    ProxySetup(String),

    // Response errors
    #[error("Malformed response: {0}")]
    Decode(#[from] serde_json::Error),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for prober operations
pub type Result<T> = std::result::Result<T, ProxyProbeError>;

impl ProxyProbeError {
    /// Check if this error is a configuration problem (as opposed to a runtime failure)
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            ProxyProbeError::InvalidConfig(_)
                | ProxyProbeError::MissingEnvVar(_)
                | ProxyProbeError::InvalidProxy(_)
        )
    }

    /// Render the error together with its source chain on one line.
    ///
    /// `reqwest` wraps the root cause ("connection refused", "dns error", ...)
    /// several levels deep, so the top-level message alone is rarely useful.
    pub fn describe(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            let text = cause.to_string();
            if !message.contains(&text) {
                message.push_str(": ");
                message.push_str(&text);
            }
            source = std::error::Error::source(cause);
        }
        message
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for ProxyProbeError {
    fn from(err: url::ParseError) -> Self {
        ProxyProbeError::InvalidConfig(err.to_string())
    }
}
