use serde::Serialize;

use crate::certificate::ExpiryInfo;
use crate::error::{ConnectionError, DecodeError, HandshakeError};
use crate::target::Target;

/// Outcome of checking one target. Exactly one stage outcome is recorded:
/// the first failure stops the check.
#[derive(Debug)]
pub enum CheckResult {
    /// Certificate obtained and decoded
    Success(ExpiryInfo),
    /// Resolution, TCP or STARTTLS negotiation failed
    ConnectionFailure(ConnectionError),
    /// TLS handshake failed
    HandshakeFailure(HandshakeError),
    /// Peer certificate could not be decoded
    DecodeFailure(DecodeError),
}

/// Coarse status of a [`CheckResult`], used by the reporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Status {
    Ok,
    ConnectionFailure,
    HandshakeFailure,
    DecodeFailure,
}

impl CheckResult {
    pub fn is_success(&self) -> bool {
        matches!(self, CheckResult::Success(_))
    }

    pub fn expiry(&self) -> Option<&ExpiryInfo> {
        match self {
            CheckResult::Success(expiry) => Some(expiry),
            _ => None,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            CheckResult::Success(_) => Status::Ok,
            CheckResult::ConnectionFailure(_) => Status::ConnectionFailure,
            CheckResult::HandshakeFailure(_) => Status::HandshakeFailure,
            CheckResult::DecodeFailure(_) => Status::DecodeFailure,
        }
    }

    /// Sub-reason of a failure, e.g. `protocol-rejected`.
    pub fn failure_kind(&self) -> Option<&'static str> {
        match self {
            CheckResult::Success(_) => None,
            CheckResult::ConnectionFailure(e) => Some(e.kind()),
            CheckResult::HandshakeFailure(e) => Some(e.kind()),
            CheckResult::DecodeFailure(e) => Some(e.kind()),
        }
    }

    /// Human readable failure description.
    pub fn reason(&self) -> Option<String> {
        match self {
            CheckResult::Success(_) => None,
            CheckResult::ConnectionFailure(e) => Some(e.to_string()),
            CheckResult::HandshakeFailure(e) => Some(e.to_string()),
            CheckResult::DecodeFailure(e) => Some(e.to_string()),
        }
    }
}

impl From<ConnectionError> for CheckResult {
    fn from(e: ConnectionError) -> Self {
        CheckResult::ConnectionFailure(e)
    }
}

impl From<HandshakeError> for CheckResult {
    fn from(e: HandshakeError) -> Self {
        CheckResult::HandshakeFailure(e)
    }
}

impl From<DecodeError> for CheckResult {
    fn from(e: DecodeError) -> Self {
        CheckResult::DecodeFailure(e)
    }
}

/// A target together with the result of checking it.
#[derive(Debug)]
pub struct CheckReport {
    pub target: Target,
    pub result: CheckResult,
}
