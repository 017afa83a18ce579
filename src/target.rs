//! Check targets and the strategies used to reach them.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, EnumIter, EnumString};
use url::Url;

/// How a plaintext connection is brought to the point where a TLS handshake
/// can start.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Strategy {
    /// TLS from the first byte
    #[serde(rename = "tls", alias = "https")]
    #[strum(to_string = "tls", serialize = "https")]
    DirectTls,
    /// SMTP with an in-band STARTTLS upgrade
    #[serde(rename = "smtp")]
    #[strum(to_string = "smtp")]
    StartTlsSmtp,
    /// XMPP client stream with an in-band STARTTLS upgrade
    #[serde(rename = "xmpp")]
    #[strum(to_string = "xmpp")]
    StartTlsXmpp,
}

impl Strategy {
    /// Well known port for the protocol.
    pub fn default_port(&self) -> u16 {
        match self {
            Strategy::DirectTls => 443,
            Strategy::StartTlsSmtp => 25,
            Strategy::StartTlsXmpp => 5222,
        }
    }

    /// Human readable protocol name.
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::DirectTls => "TLS",
            Strategy::StartTlsSmtp => "SMTP",
            Strategy::StartTlsXmpp => "XMPP",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// One endpoint to check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    /// Name used for DNS, SNI, XMPP stream addressing and verification
    pub hostname: String,
    /// Port to connect to
    pub port: u16,
    /// How to reach the TLS handshake
    pub strategy: Strategy,
    /// Connect here instead of resolving `hostname`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_addr: Option<SocketAddr>,
}

impl Target {
    pub fn new<S: Into<String>>(hostname: S, port: u16, strategy: Strategy) -> Self {
        Target {
            hostname: hostname.into(),
            port,
            strategy,
            connect_addr: None,
        }
    }

    /// Pins the socket address, bypassing DNS for this target.
    pub fn with_connect_addr(mut self, addr: SocketAddr) -> Self {
        self.connect_addr = Some(addr);
        self
    }

    /// `host:port` as used for DNS resolution and log lines.
    pub fn address(&self) -> String {
        match self.connect_addr {
            Some(addr) => addr.to_string(),
            None => format!("{}:{}", self.hostname, self.port),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.strategy, self.hostname, self.port)
    }
}

/// Error produced when a target string cannot be understood.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetParseError {
    /// The input that was rejected
    pub input: String,
    /// Why it was rejected
    pub reason: String,
}

impl fmt::Display for TargetParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid target '{}': {}", self.input, self.reason)
    }
}

impl std::error::Error for TargetParseError {}

impl FromStr for Target {
    type Err = TargetParseError;

    /// Parses `scheme://host[:port]` or a bare `host[:port]`, which means
    /// direct TLS.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let fail = |reason: &str| TargetParseError {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        if input.is_empty() {
            return Err(fail("target cannot be empty"));
        }

        let with_scheme = if input.contains("://") {
            input.to_string()
        } else {
            format!("tls://{}", input)
        };
        let url = Url::parse(&with_scheme).map_err(|e| fail(&e.to_string()))?;

        let strategy = Strategy::from_str(url.scheme())
            .map_err(|_| fail("unsupported scheme, expected tls, https, smtp or xmpp"))?;

        let hostname = match url.host_str() {
            Some(h) if !h.is_empty() => h.trim_start_matches('[').trim_end_matches(']'),
            _ => return Err(fail("missing hostname")),
        };

        let port = url.port().unwrap_or_else(|| strategy.default_port());
        if port == 0 {
            return Err(fail("port must be between 1 and 65535"));
        }

        Ok(Target::new(hostname, port, strategy))
    }
}
