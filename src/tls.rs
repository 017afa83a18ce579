//! TLS handshake adapter.
//!
//! Wraps a connected stream in TLS, runs the handshake and captures the
//! peer's leaf certificate in DER form.

use std::io::{self, Read, Write};
use std::path::PathBuf;

use log::debug;
use openssl::ssl::{
    HandshakeError as SslHandshakeError, SslConnector, SslContextBuilder, SslFiletype, SslMethod,
    SslVerifyMode,
};
use openssl::x509::store::X509Lookup;
use openssl::x509::X509VerifyResult;

use crate::error::HandshakeError;
use crate::CheckOptions;

/// DER encoded leaf certificate exactly as presented by the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCertificate(Vec<u8>);

impl RawCertificate {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for RawCertificate {
    fn from(der: Vec<u8>) -> Self {
        RawCertificate(der)
    }
}

/// Where verification looks for trust anchors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustLocations {
    /// PEM bundle
    pub cert_file: Option<PathBuf>,
    /// Hashed certificate directory
    pub cert_dir: Option<PathBuf>,
}

impl TrustLocations {
    /// The host's CA bundle as found by `openssl_probe`. `SSL_CERT_FILE` and
    /// `SSL_CERT_DIR` take precedence over the well-known distribution paths.
    pub fn system() -> Self {
        let found = openssl_probe::probe();
        TrustLocations {
            cert_file: found.cert_file,
            cert_dir: found.cert_dir,
        }
    }

    /// `options.ca_file` when set, the system bundle otherwise.
    pub fn for_options(options: &CheckOptions) -> Self {
        match &options.ca_file {
            Some(file) => TrustLocations {
                cert_file: Some(file.clone()),
                cert_dir: None,
            },
            None => Self::system(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cert_file.is_none() && self.cert_dir.is_none()
    }

    fn load(&self, builder: &mut SslContextBuilder) -> Result<(), HandshakeError> {
        if let Some(file) = &self.cert_file {
            builder
                .set_ca_file(file)
                .map_err(|e| HandshakeError::VerificationFailed {
                    details: format!("cannot load trust anchors from {}: {}", file.display(), e),
                })?;
        }
        if let Some(dir) = &self.cert_dir {
            let loaded = builder
                .cert_store_mut()
                .add_lookup(X509Lookup::hash_dir())
                .and_then(|lookup| lookup.add_dir(&dir.to_string_lossy(), SslFiletype::PEM));
            if let Err(e) = loaded {
                return Err(HandshakeError::VerificationFailed {
                    details: format!("cannot load trust anchors from {}: {}", dir.display(), e),
                });
            }
        }
        Ok(())
    }
}

/// Builds the client context. The vendored OpenSSL only looks under its own
/// build prefix, so verification loads [`TrustLocations::for_options`]
/// explicitly.
pub fn connector(options: &CheckOptions) -> Result<SslConnector, HandshakeError> {
    let mut builder = SslConnector::builder(SslMethod::tls())?;
    if options.verify {
        let locations = TrustLocations::for_options(options);
        if locations.is_empty() {
            debug!("no CA bundle found on this host, relying on OpenSSL defaults");
        }
        locations.load(&mut builder)?;
    }
    Ok(builder.build())
}

/// Performs a TLS handshake over `stream` and returns the peer's leaf
/// certificate.
///
/// `hostname` is sent as SNI. With `options.verify` set, the trust anchors
/// and hostname check apply and a failed check is reported as
/// [`HandshakeError::VerificationFailed`]; without it any certificate is
/// accepted so its expiry can still be read.
///
/// The TLS session and the underlying stream are dropped before returning.
pub fn handshake<S>(
    stream: S,
    hostname: &str,
    options: &CheckOptions,
) -> Result<RawCertificate, HandshakeError>
where
    S: Read + Write,
{
    let mut config = connector(options)?.configure()?;
    if !options.verify {
        config.set_verify_hostname(false);
        config.set_verify(SslVerifyMode::NONE);
    }

    let tls_stream = config
        .connect(hostname, stream)
        .map_err(|e| classify(e, options.verify))?;
    debug!(
        "TLS established with {} using {} ({})",
        hostname,
        tls_stream
            .ssl()
            .current_cipher()
            .map(|c| c.name())
            .unwrap_or("unknown cipher"),
        tls_stream.ssl().version_str()
    );

    let certificate = tls_stream
        .ssl()
        .peer_certificate()
        .ok_or_else(|| HandshakeError::NegotiationFailed {
            details: "peer presented no certificate".to_string(),
        })?;
    let der = certificate.to_der()?;
    Ok(RawCertificate(der))
}

/// OpenSSL records a verify result even under `SslVerifyMode::NONE`, so it
/// only counts when `verify` was requested.
fn classify<S>(err: SslHandshakeError<S>, verify: bool) -> HandshakeError {
    match err {
        SslHandshakeError::SetupFailure(stack) => stack.into(),
        // A blocking socket only reports WouldBlock once its read timeout fired
        SslHandshakeError::WouldBlock(_) => HandshakeError::Timeout,
        SslHandshakeError::Failure(mid) => {
            let verify_result = mid.ssl().verify_result();
            if verify && verify_result != X509VerifyResult::OK {
                return HandshakeError::VerificationFailed {
                    details: verify_result.error_string().to_string(),
                };
            }
            let timed_out = mid
                .error()
                .io_error()
                .map(|e| is_timeout(e.kind()))
                .unwrap_or(false);
            if timed_out {
                return HandshakeError::Timeout;
            }
            HandshakeError::NegotiationFailed {
                details: mid.error().to_string(),
            }
        }
    }
}

pub(crate) fn is_timeout(kind: io::ErrorKind) -> bool {
    matches!(kind, io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
}
