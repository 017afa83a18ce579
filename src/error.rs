//! Error types for each stage of a certificate check.
//!
//! Every stage converts the failures it can characterize into one of the
//! enums below. [`Checker::check`](crate::Checker::check) folds them into a
//! [`CheckResult`](crate::CheckResult) so callers only ever see one value per
//! target.

use std::fmt;
use std::io;

use crate::target::Strategy;

/// Failure while opening the connection or negotiating the STARTTLS upgrade.
#[derive(Debug)]
pub enum ConnectionError {
    /// DNS resolution failed for the given hostname
    DnsResolution {
        /// The hostname that failed to resolve
        hostname: String,
        /// The underlying I/O error, if the resolver produced one
        source: Option<io::Error>,
    },

    /// TCP connection was refused or otherwise failed
    TcpRefused {
        /// The address (host:port) that connection failed to
        address: String,
        /// The underlying I/O error
        source: io::Error,
    },

    /// TCP connection did not complete within the timeout
    TcpTimeout {
        /// The address (host:port) that timed out
        address: String,
    },

    /// The server refused or never completed the STARTTLS upgrade
    ProtocolRejected {
        /// Strategy that was negotiating
        strategy: Strategy,
        /// What the server said or did instead
        details: String,
    },
}

impl ConnectionError {
    /// Stable name of the sub-reason.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DnsResolution { .. } => "dns-resolution",
            Self::TcpRefused { .. } => "tcp-refused",
            Self::TcpTimeout { .. } => "tcp-timeout",
            Self::ProtocolRejected { .. } => "protocol-rejected",
        }
    }

    pub(crate) fn rejected<S: Into<String>>(strategy: Strategy, details: S) -> Self {
        Self::ProtocolRejected {
            strategy,
            details: details.into(),
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DnsResolution { hostname, .. } => {
                write!(f, "Failed to resolve hostname: {}", hostname)
            }
            Self::TcpRefused { address, source } => {
                write!(f, "Connection failed to {}: {}", address, source)
            }
            Self::TcpTimeout { address } => {
                write!(f, "Connection to {} timed out", address)
            }
            Self::ProtocolRejected { strategy, details } => {
                write!(f, "{} STARTTLS upgrade rejected: {}", strategy.label(), details)
            }
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::DnsResolution {
                source: Some(source),
                ..
            } => Some(source),
            Self::TcpRefused { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Failure during the TLS handshake.
#[derive(Debug)]
pub enum HandshakeError {
    /// The peer stopped responding before the handshake finished
    Timeout,

    /// Protocol version or cipher negotiation failed, or the peer is not a
    /// TLS server at all
    NegotiationFailed {
        /// Details about why the handshake failed
        details: String,
    },

    /// The peer certificate did not pass the handshake-time trust check
    VerificationFailed {
        /// The verifier's explanation
        details: String,
    },
}

impl HandshakeError {
    /// Stable name of the sub-reason.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::NegotiationFailed { .. } => "negotiation-failed",
            Self::VerificationFailed { .. } => "verification-failed",
        }
    }
}

impl fmt::Display for HandshakeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "TLS handshake timed out"),
            Self::NegotiationFailed { details } => {
                write!(f, "TLS handshake failed: {}", details)
            }
            Self::VerificationFailed { details } => {
                write!(f, "Certificate verification failed: {}", details)
            }
        }
    }
}

impl std::error::Error for HandshakeError {}

impl From<openssl::error::ErrorStack> for HandshakeError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::NegotiationFailed {
            details: e.to_string(),
        }
    }
}

/// Failure while decoding the peer certificate.
#[derive(Debug)]
pub enum DecodeError {
    /// The DER blob is not a certificate, or its validity cannot be read
    MalformedCertificate {
        /// Description of what went wrong
        reason: String,
    },
}

impl DecodeError {
    /// Stable name of the sub-reason.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedCertificate { .. } => "malformed-certificate",
        }
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedCertificate { reason } => {
                write!(f, "Malformed certificate: {}", reason)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

impl From<openssl::error::ErrorStack> for DecodeError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::MalformedCertificate {
            reason: e.to_string(),
        }
    }
}
