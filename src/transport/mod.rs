//! Transport strategies.
//!
//! A strategy opens a TCP connection and leaves it positioned so that the
//! next bytes on the wire are the TLS ClientHello. Direct TLS needs nothing
//! more; the STARTTLS strategies first run a short plaintext exchange that is
//! modelled as a closed state machine, see [`Negotiator`].

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use log::debug;

use crate::error::ConnectionError;
use crate::target::{Strategy, Target};
use crate::tls::is_timeout;
use crate::CheckOptions;

pub mod smtp;
pub mod xmpp;

pub use smtp::SmtpNegotiator;
pub use xmpp::XmppNegotiator;

/// Progress of a STARTTLS negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    /// TCP is up, nothing exchanged yet
    Connected,
    /// Our greeting (EHLO / stream header) is on the wire
    GreetingSent,
    /// The STARTTLS request is on the wire
    UpgradeRequested,
    /// The server agreed; the TLS handshake may start
    UpgradeAcknowledged,
}

/// Protocol-specific STARTTLS exchange.
///
/// `step` is the transition function: given the current state it performs
/// the reads and writes belonging to that state and returns the next one.
/// `UpgradeAcknowledged` is terminal and must be returned unchanged.
pub trait Negotiator {
    fn strategy(&self) -> Strategy;

    fn step<S: Read + Write>(
        &mut self,
        state: NegotiationState,
        stream: &mut S,
    ) -> Result<NegotiationState, ConnectionError>;
}

/// Drives `negotiator` from `Connected` to `UpgradeAcknowledged`.
pub fn negotiate<N, S>(negotiator: &mut N, stream: &mut S) -> Result<(), ConnectionError>
where
    N: Negotiator,
    S: Read + Write,
{
    let mut state = NegotiationState::Connected;
    while state != NegotiationState::UpgradeAcknowledged {
        let next = negotiator.step(state, stream)?;
        debug!("{} negotiation: {:?} -> {:?}", negotiator.strategy().label(), state, next);
        state = next;
    }
    Ok(())
}

/// Opens a connection to `target` and runs its strategy's plaintext
/// negotiation.
///
/// Every read and write on the returned stream is bounded by
/// `options.timeout`, which carries over into the TLS handshake.
pub fn connect(target: &Target, options: &CheckOptions) -> Result<TcpStream, ConnectionError> {
    let addresses = resolve(target)?;
    let mut stream = open(target, &addresses, options.timeout)?;

    match target.strategy {
        Strategy::DirectTls => {}
        Strategy::StartTlsSmtp => {
            negotiate(&mut SmtpNegotiator::new(&options.ehlo_name), &mut stream)?;
        }
        Strategy::StartTlsXmpp => {
            negotiate(&mut XmppNegotiator::new(&target.hostname), &mut stream)?;
        }
    }
    Ok(stream)
}

fn resolve(target: &Target) -> Result<Vec<SocketAddr>, ConnectionError> {
    if let Some(addr) = target.connect_addr {
        return Ok(vec![addr]);
    }
    let addresses: Vec<SocketAddr> = (target.hostname.as_str(), target.port)
        .to_socket_addrs()
        .map_err(|e| ConnectionError::DnsResolution {
            hostname: target.hostname.clone(),
            source: Some(e),
        })?
        .collect();
    if addresses.is_empty() {
        return Err(ConnectionError::DnsResolution {
            hostname: target.hostname.clone(),
            source: None,
        });
    }
    Ok(addresses)
}

/// Tries `addresses` in order. All attempts share one `timeout` budget.
fn open(
    target: &Target,
    addresses: &[SocketAddr],
    timeout: Duration,
) -> Result<TcpStream, ConnectionError> {
    let deadline = Instant::now() + timeout;
    let mut last_error = None;
    for address in addresses {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(ConnectionError::TcpTimeout {
                address: target.address(),
            });
        }
        match TcpStream::connect_timeout(address, remaining) {
            Ok(stream) => {
                let configured = stream
                    .set_read_timeout(Some(timeout))
                    .and_then(|_| stream.set_write_timeout(Some(timeout)));
                if let Err(e) = configured {
                    return Err(ConnectionError::TcpRefused {
                        address: address.to_string(),
                        source: e,
                    });
                }
                debug!("connected to {} ({})", target, address);
                return Ok(stream);
            }
            Err(e) => {
                debug!("connection to {} ({}) failed: {}", target, address, e);
                last_error = Some(e);
            }
        }
    }

    let address = target.address();
    match last_error {
        Some(e) if is_timeout(e.kind()) => Err(ConnectionError::TcpTimeout { address }),
        Some(e) => Err(ConnectionError::TcpRefused { address, source: e }),
        None => Err(ConnectionError::DnsResolution {
            hostname: target.hostname.clone(),
            source: None,
        }),
    }
}

/// Maps an I/O failure in the middle of a negotiation: the server did not
/// complete the upgrade.
pub(crate) fn interrupted(
    strategy: Strategy,
    waiting_for: &str,
    err: io::Error,
) -> ConnectionError {
    let details = if is_timeout(err.kind()) {
        format!("timed out waiting for {}", waiting_for)
    } else {
        format!("I/O error waiting for {}: {}", waiting_for, err)
    };
    ConnectionError::rejected(strategy, details)
}

pub(crate) fn send<S: Write>(
    stream: &mut S,
    strategy: Strategy,
    payload: &[u8],
) -> Result<(), ConnectionError> {
    stream
        .write_all(payload)
        .and_then(|_| stream.flush())
        .map_err(|e| interrupted(strategy, "the server to accept data", e))
}
