use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ProxyProbeError, Result};

/// One authenticated HTTP proxy endpoint
///
/// The pool is an ordered `Vec<ProxyConfig>`; order defines rotation order
/// and duplicates are allowed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProxyConfig {
    pub ip: String,
    pub port: u16,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String,
}

impl ProxyConfig {
    pub fn new(
        ip: impl Into<String>,
        port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            ip: ip.into(),
            port,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Label used in probe results (`ip:port`)
    pub fn label(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Reject entries that cannot authenticate as written.
    ///
    /// A username with an empty password would be sent without any
    /// `Proxy-Authorization` header, so it is refused up front. Both empty
    /// means an open proxy.
    pub fn validate(&self) -> Result<()> {
        if self.ip.is_empty() {
            return Err(ProxyProbeError::InvalidProxy("empty host".to_string()));
        }
        if !self.username.is_empty() && self.password.is_empty() {
            return Err(ProxyProbeError::InvalidProxy(format!(
                "{}: username '{}' has an empty password",
                self.label(),
                self.username
            )));
        }
        Ok(())
    }

    /// Proxy URI of the form `http://username:password@ip:port`
    ///
    /// Credentials are percent-encoded; IPv6 hosts are bracketed.
    pub fn url(&self) -> Result<Url> {
        let host = if self.ip.contains(':') && !self.ip.starts_with('[') {
            format!("[{}]", self.ip)
        } else {
            self.ip.clone()
        };

        let mut url = Url::parse(&format!("http://{}:{}", host, self.port))
            .map_err(|e| ProxyProbeError::InvalidProxy(format!("{}: {}", self.label(), e)))?;

        let invalid = |_| {
            ProxyProbeError::InvalidProxy(format!("{}: cannot carry credentials", self.label()))
        };
        if !self.username.is_empty() {
            url.set_username(&self.username).map_err(invalid)?;
            url.set_password(Some(&self.password)).map_err(invalid)?;
        }

        Ok(url)
    }
}

impl std::fmt::Display for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl std::str::FromStr for ProxyConfig {
    type Err = ProxyProbeError;

    /// Parse `ip:port:username:password`. The password is everything after the
    /// third separator so it may itself contain `:`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let mut parts = s.splitn(4, ':');

        let (ip, port, username, password) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(ip), Some(port), Some(user), Some(pass)) if !ip.is_empty() => {
                    (ip, port, user, pass)
                }
                _ => {
                    return Err(ProxyProbeError::InvalidProxy(format!(
                        "expected ip:port:username:password, got '{}'",
                        s
                    )))
                }
            };

        let port = port.parse::<u16>().map_err(|_| {
            ProxyProbeError::InvalidProxy(format!("invalid port '{}' in '{}'", port, ip))
        })?;

        let proxy = Self::new(ip, port, username, password);
        proxy.validate()?;
        Ok(proxy)
    }
}
