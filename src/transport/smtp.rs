//! SMTP STARTTLS negotiation.
//!
//! Greeting, EHLO and STARTTLS, nothing else. Replies are read one byte at a
//! time so no byte past the final reply line is consumed before the TLS
//! handshake takes over the socket.

use std::io::{Read, Write};

use log::debug;

use super::{interrupted, send, NegotiationState, Negotiator};
use crate::error::ConnectionError;
use crate::target::Strategy;

/// Longest reply line accepted, CRLF included.
const MAX_LINE: usize = 1000;

/// A complete, possibly multi-line, SMTP reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    /// Text of each line without the code and separator
    pub lines: Vec<String>,
}

impl Reply {
    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// True if an EHLO reply lists `keyword` as an extension.
    pub fn has_extension(&self, keyword: &str) -> bool {
        self.lines.iter().any(|line| {
            line.split_whitespace()
                .next()
                .map(|ext| ext.eq_ignore_ascii_case(keyword))
                .unwrap_or(false)
        })
    }

    fn summary(&self) -> String {
        format!("{} {}", self.code, self.lines.join(" / "))
            .trim_end()
            .to_string()
    }
}

/// Runs the client side of an SMTP STARTTLS upgrade.
#[derive(Debug)]
pub struct SmtpNegotiator {
    ehlo_name: String,
}

impl SmtpNegotiator {
    /// `ehlo_name` is the client identity announced in EHLO.
    pub fn new<S: Into<String>>(ehlo_name: S) -> Self {
        SmtpNegotiator {
            ehlo_name: ehlo_name.into(),
        }
    }

    fn read_reply<S: Read>(stream: &mut S, waiting_for: &str) -> Result<Reply, ConnectionError> {
        let mut code = None;
        let mut lines = Vec::new();
        loop {
            let line = Self::read_line(stream, waiting_for)?;
            let rejected = |what: &str| {
                ConnectionError::rejected(
                    Strategy::StartTlsSmtp,
                    format!("{} while waiting for {}: {:?}", what, waiting_for, line),
                )
            };
            if line.len() < 3 || !line.is_char_boundary(3) {
                return Err(rejected("malformed reply"));
            }
            let line_code: u16 = line[..3].parse().map_err(|_| rejected("malformed reply"))?;
            if *code.get_or_insert(line_code) != line_code {
                return Err(rejected("inconsistent reply codes"));
            }

            let (separator, text) = match line.get(3..4) {
                Some(sep) => (sep, line[4..].to_string()),
                None => (" ", String::new()),
            };
            lines.push(text);
            match separator {
                "-" => continue,
                " " => break,
                _ => return Err(rejected("malformed reply")),
            }
        }
        Ok(Reply {
            code: code.unwrap_or_default(),
            lines,
        })
    }

    /// Reads one CRLF (or bare LF) terminated line, without the terminator.
    fn read_line<S: Read>(stream: &mut S, waiting_for: &str) -> Result<String, ConnectionError> {
        let mut line = Vec::with_capacity(128);
        let mut byte = [0u8; 1];
        loop {
            let n = stream
                .read(&mut byte)
                .map_err(|e| interrupted(Strategy::StartTlsSmtp, waiting_for, e))?;
            if n == 0 {
                return Err(ConnectionError::rejected(
                    Strategy::StartTlsSmtp,
                    format!("connection closed while waiting for {}", waiting_for),
                ));
            }
            if byte[0] == b'\n' {
                break;
            }
            line.push(byte[0]);
            if line.len() > MAX_LINE {
                return Err(ConnectionError::rejected(
                    Strategy::StartTlsSmtp,
                    format!("reply line too long while waiting for {}", waiting_for),
                ));
            }
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }
}

impl Negotiator for SmtpNegotiator {
    fn strategy(&self) -> Strategy {
        Strategy::StartTlsSmtp
    }

    fn step<S: Read + Write>(
        &mut self,
        state: NegotiationState,
        stream: &mut S,
    ) -> Result<NegotiationState, ConnectionError> {
        match state {
            NegotiationState::Connected => {
                let greeting = Self::read_reply(stream, "the greeting")?;
                if greeting.code != 220 {
                    return Err(ConnectionError::rejected(
                        Strategy::StartTlsSmtp,
                        format!("unexpected greeting: {}", greeting.summary()),
                    ));
                }
                let ehlo = format!("EHLO {}\r\n", self.ehlo_name);
                send(stream, Strategy::StartTlsSmtp, ehlo.as_bytes())?;
                Ok(NegotiationState::GreetingSent)
            }
            NegotiationState::GreetingSent => {
                let ehlo = Self::read_reply(stream, "the EHLO reply")?;
                if !ehlo.is_positive() {
                    return Err(ConnectionError::rejected(
                        Strategy::StartTlsSmtp,
                        format!("EHLO refused: {}", ehlo.summary()),
                    ));
                }
                if !ehlo.has_extension("STARTTLS") {
                    return Err(ConnectionError::rejected(
                        Strategy::StartTlsSmtp,
                        "server does not advertise STARTTLS",
                    ));
                }
                send(stream, Strategy::StartTlsSmtp, b"STARTTLS\r\n")?;
                Ok(NegotiationState::UpgradeRequested)
            }
            NegotiationState::UpgradeRequested => {
                let reply = Self::read_reply(stream, "the STARTTLS reply")?;
                if !reply.is_positive() {
                    return Err(ConnectionError::rejected(
                        Strategy::StartTlsSmtp,
                        reply.summary(),
                    ));
                }
                debug!("SMTP server accepted STARTTLS: {}", reply.summary());
                Ok(NegotiationState::UpgradeAcknowledged)
            }
            NegotiationState::UpgradeAcknowledged => Ok(state),
        }
    }
}
