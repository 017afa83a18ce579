//! Certificate decoding.
//!
//! Turns the DER blob captured during the handshake into the certificate's
//! "not valid after" timestamp.

use chrono::{DateTime, TimeZone, Utc};
use openssl::asn1::{Asn1Time, Asn1TimeRef};
use openssl::x509::X509;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::tls::RawCertificate;

/// Format used when showing an expiry to a person, e.g.
/// `01. January 2030, 00:00`.
pub const EXPIRY_FORMAT: &str = "%d. %B %Y, %H:%M";

/// Expiry of a single certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryInfo {
    /// Instant after which the certificate is no longer valid (UTC, seconds)
    pub not_after: DateTime<Utc>,
}

impl ExpiryInfo {
    /// The expiry rendered with [`EXPIRY_FORMAT`].
    pub fn formatted(&self) -> String {
        self.not_after.format(EXPIRY_FORMAT).to_string()
    }

    /// Whole days between `now` and the expiry, negative once expired.
    pub fn days_remaining(&self, now: DateTime<Utc>) -> i64 {
        (self.not_after - now).num_days()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.not_after < now
    }
}

/// Decodes a DER certificate and extracts its notAfter field.
///
/// # Errors
///
/// Returns [`DecodeError::MalformedCertificate`] when the bytes are not a
/// DER certificate or its validity cannot be turned into a timestamp.
pub fn decode(raw: RawCertificate) -> Result<ExpiryInfo, DecodeError> {
    let x509 = X509::from_der(raw.as_bytes())?;
    let not_after = asn1_to_utc(x509.not_after())?;
    Ok(ExpiryInfo { not_after })
}

fn asn1_to_utc(time: &Asn1TimeRef) -> Result<DateTime<Utc>, DecodeError> {
    let epoch = Asn1Time::from_unix(0)?;
    let diff = epoch.diff(time)?;
    let seconds = i64::from(diff.days) * 86_400 + i64::from(diff.secs);
    Utc.timestamp_opt(seconds, 0)
        .single()
        .ok_or_else(|| DecodeError::MalformedCertificate {
            reason: format!("notAfter {} is out of range", time),
        })
}
