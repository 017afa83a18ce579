//! XMPP STARTTLS negotiation.
//!
//! Server output is scanned for a handful of tokens with bounded reads; it is
//! never parsed as XML.

use std::io::{Read, Write};

use log::debug;

use super::{interrupted, send, NegotiationState, Negotiator};
use crate::error::ConnectionError;
use crate::target::Strategy;

/// Size of a single read.
const READ_CHUNK: usize = 2048;
/// Most bytes read while waiting for any one server response.
const READ_CEILING: usize = 8192;

const STARTTLS: &str = "<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>";

/// Runs the client side of an XMPP STARTTLS upgrade.
#[derive(Debug)]
pub struct XmppNegotiator {
    hostname: String,
}

impl XmppNegotiator {
    /// `hostname` is the domain the stream is addressed to.
    pub fn new<S: Into<String>>(hostname: S) -> Self {
        XmppNegotiator {
            hostname: hostname.into(),
        }
    }

    fn stream_header(&self) -> String {
        format!(
            "<?xml version='1.0'?><stream:stream xmlns='jabber:client' \
             xmlns:stream='http://etherx.jabber.org/streams' \
             xmlns:tls='http://www.ietf.org/rfc/rfc2595.txt' to='{}' version='1.0'>",
            self.hostname
        )
    }

    /// Reads until `done` accepts the accumulated text, the ceiling is hit or
    /// the peer goes away. Returns the text and whether `done` matched.
    fn read_until<S, F>(
        stream: &mut S,
        waiting_for: &str,
        done: F,
    ) -> Result<(String, bool), ConnectionError>
    where
        S: Read,
        F: Fn(&str) -> bool,
    {
        let mut accumulated = String::new();
        let mut buffer = [0u8; READ_CHUNK];
        while accumulated.len() < READ_CEILING {
            let n = stream
                .read(&mut buffer)
                .map_err(|e| interrupted(Strategy::StartTlsXmpp, waiting_for, e))?;
            if n == 0 {
                return Err(ConnectionError::rejected(
                    Strategy::StartTlsXmpp,
                    format!("connection closed while waiting for {}", waiting_for),
                ));
            }
            accumulated.push_str(&String::from_utf8_lossy(&buffer[..n]));
            if done(&accumulated) {
                return Ok((accumulated, true));
            }
            if is_stream_failure(&accumulated) {
                break;
            }
        }
        Ok((accumulated, false))
    }
}

fn is_stream_failure(text: &str) -> bool {
    text.contains("<stream:error") || text.contains("</stream:stream>")
}

/// `<proceed .../>` seen in full, so nothing of it is left on the wire.
fn proceed_complete(text: &str) -> bool {
    text.find("<proceed")
        .map(|start| text[start..].contains('>'))
        .unwrap_or(false)
}

fn excerpt(text: &str) -> String {
    let trimmed: String = text.chars().take(120).collect();
    trimmed.trim().to_string()
}

impl Negotiator for XmppNegotiator {
    fn strategy(&self) -> Strategy {
        Strategy::StartTlsXmpp
    }

    fn step<S: Read + Write>(
        &mut self,
        state: NegotiationState,
        stream: &mut S,
    ) -> Result<NegotiationState, ConnectionError> {
        match state {
            NegotiationState::Connected => {
                send(stream, Strategy::StartTlsXmpp, self.stream_header().as_bytes())?;
                Ok(NegotiationState::GreetingSent)
            }
            NegotiationState::GreetingSent => {
                // Best effort: a truncated feature list is discarded all the same
                let (features, complete) = Self::read_until(stream, "stream features", |text| {
                    text.contains("</stream:features>")
                })?;
                if is_stream_failure(&features) {
                    return Err(ConnectionError::rejected(
                        Strategy::StartTlsXmpp,
                        format!("stream closed by server: {}", excerpt(&features)),
                    ));
                }
                debug!(
                    "XMPP features received ({} bytes, complete: {}, starttls offered: {})",
                    features.len(),
                    complete,
                    features.contains("<starttls")
                );
                send(stream, Strategy::StartTlsXmpp, STARTTLS.as_bytes())?;
                Ok(NegotiationState::UpgradeRequested)
            }
            NegotiationState::UpgradeRequested => {
                let (reply, proceed) =
                    Self::read_until(stream, "the STARTTLS acknowledgement", |text| {
                        proceed_complete(text) || text.contains("<failure")
                    })?;
                if proceed && proceed_complete(&reply) {
                    Ok(NegotiationState::UpgradeAcknowledged)
                } else {
                    Err(ConnectionError::rejected(
                        Strategy::StartTlsXmpp,
                        format!("server answered {}", excerpt(&reply)),
                    ))
                }
            }
            NegotiationState::UpgradeAcknowledged => Ok(state),
        }
    }
}
