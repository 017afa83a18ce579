//! Certificate expiry checks over direct TLS and STARTTLS.
//!
//! A check runs three stages, each with its own error type:
//!
//! 1. [`transport::connect`] opens TCP and, for SMTP and XMPP, negotiates
//!    the STARTTLS upgrade.
//! 2. [`tls::handshake`] runs the TLS handshake and captures the peer's leaf
//!    certificate as DER.
//! 3. [`certificate::decode`] extracts the notAfter timestamp.
//!
//! The first failing stage ends the check, and every outcome is folded into
//! a single [`CheckResult`]. Nothing in the library writes to stdout; see
//! [`report`] for rendering.
//!
//! ```no_run
//! use certlife::{CheckOptions, Checker, Target};
//!
//! let checker = Checker::new(CheckOptions::default());
//! let target: Target = "smtp://mail.example.com".parse()?;
//! let result = checker.check(&target);
//! if let Some(expiry) = result.expiry() {
//!     println!("{} expires on {}", target, expiry.formatted());
//! }
//! # Ok::<(), certlife::TargetParseError>(())
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

pub mod certificate;
pub mod config;
pub mod error;
pub mod report;
pub mod result;
pub mod target;
pub mod tls;
pub mod transport;

pub use certificate::ExpiryInfo;
pub use error::{ConnectionError, DecodeError, HandshakeError};
pub use result::{CheckReport, CheckResult, Status};
pub use target::{Strategy, Target, TargetParseError};
pub use tls::RawCertificate;

/// Default bound for every network operation, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Settings shared by every check.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Bound for connect, each read and write, and the TLS handshake
    pub timeout: Duration,
    /// Enforce the default trust store and hostname check during the handshake
    pub verify: bool,
    /// Name announced in SMTP EHLO
    pub ehlo_name: String,
    /// PEM trust anchors replacing the system store when verifying
    pub ca_file: Option<PathBuf>,
}

impl Default for CheckOptions {
    fn default() -> Self {
        CheckOptions {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            verify: true,
            ehlo_name: "localhost".to_string(),
            ca_file: None,
        }
    }
}

/// Runs certificate checks.
#[derive(Debug, Clone, Default)]
pub struct Checker {
    pub options: CheckOptions,
}

impl Checker {
    pub fn new(options: CheckOptions) -> Self {
        Checker { options }
    }

    /// Checks one target. Never panics on network or certificate problems;
    /// every failure comes back as a [`CheckResult`] variant.
    pub fn check(&self, target: &Target) -> CheckResult {
        info!("checking {}", target);

        let stream = match transport::connect(target, &self.options) {
            Ok(stream) => stream,
            Err(e) => return self.failed(target, e.into()),
        };
        let raw = match tls::handshake(stream, &target.hostname, &self.options) {
            Ok(raw) => raw,
            Err(e) => return self.failed(target, e.into()),
        };
        match certificate::decode(raw) {
            Ok(expiry) => {
                debug!("{} expires {}", target, expiry.not_after);
                CheckResult::Success(expiry)
            }
            Err(e) => self.failed(target, e.into()),
        }
    }

    /// Checks every target with at most `parallelism` checks in flight.
    ///
    /// Reports come back in the order of `targets` whatever order the checks
    /// finish in. A `parallelism` of 1 checks the targets one after another.
    pub fn check_all(&self, targets: &[Target], parallelism: usize) -> Vec<CheckReport> {
        let workers = parallelism.max(1).min(targets.len());
        let next = AtomicUsize::new(0);
        let (sender, receiver) = mpsc::channel();

        thread::scope(|scope| {
            for _ in 0..workers {
                let sender = sender.clone();
                let next = &next;
                scope.spawn(move || loop {
                    let index = next.fetch_add(1, Ordering::Relaxed);
                    let target = match targets.get(index) {
                        Some(target) => target,
                        None => break,
                    };
                    if sender.send((index, self.check(target))).is_err() {
                        break;
                    }
                });
            }
        });
        drop(sender);

        let mut slots: Vec<Option<CheckResult>> = targets.iter().map(|_| None).collect();
        for (index, result) in receiver {
            slots[index] = Some(result);
        }
        targets
            .iter()
            .zip(slots)
            .filter_map(|(target, result)| {
                result.map(|result| CheckReport {
                    target: target.clone(),
                    result,
                })
            })
            .collect()
    }

    fn failed(&self, target: &Target, result: CheckResult) -> CheckResult {
        if let Some(reason) = result.reason() {
            warn!("{}: {}", target, reason);
        }
        result
    }
}
