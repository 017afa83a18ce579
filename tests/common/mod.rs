//! In-process servers for the integration tests.
#![allow(dead_code)]

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;
use std::time::Duration;

use openssl::asn1::Asn1Time;
use openssl::ec::{EcGroup, EcKey};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::ssl::{SslAcceptor, SslAcceptorBuilder, SslMethod, SslVerifyMode, SslVersion};
use openssl::x509::extension::{BasicConstraints, KeyUsage, SubjectAlternativeName};
use openssl::x509::{X509Builder, X509Name, X509NameBuilder, X509};

/// 2030-01-01T00:00:00Z
pub const JAN_2030: i64 = 1_893_456_000;

fn ec_key() -> PKey<Private> {
    let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
    PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap()
}

fn name(common_name: &str) -> X509Name {
    let mut name = X509NameBuilder::new().unwrap();
    name.append_entry_by_text("CN", common_name).unwrap();
    name.build()
}

fn certificate_builder(subject: &X509Name, pkey: &PKey<Private>, not_after: i64) -> X509Builder {
    let mut cert = X509Builder::new().unwrap();
    cert.set_version(2).unwrap();
    cert.set_subject_name(subject).unwrap();
    cert.set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    cert.set_not_after(&Asn1Time::from_unix(not_after).unwrap())
        .unwrap();
    cert.set_pubkey(pkey).unwrap();
    cert
}

fn acceptor_builder(pkey: &PKey<Private>, cert: &X509) -> SslAcceptorBuilder {
    let mut builder = SslAcceptor::mozilla_intermediate_v5(SslMethod::tls()).unwrap();
    builder.set_private_key(pkey).unwrap();
    builder.set_certificate(cert).unwrap();
    builder.check_private_key().unwrap();
    builder
}

/// TLS acceptor presenting a fresh self-signed certificate for `common_name`
/// that expires at `not_after` (unix seconds).
pub fn acceptor(common_name: &str, not_after: i64) -> SslAcceptor {
    self_signed(common_name, not_after).build()
}

fn self_signed(common_name: &str, not_after: i64) -> SslAcceptorBuilder {
    let pkey = ec_key();
    let name = name(common_name);
    let mut cert = certificate_builder(&name, &pkey, not_after);
    cert.set_issuer_name(&name).unwrap();
    cert.sign(&pkey, MessageDigest::sha256()).unwrap();
    acceptor_builder(&pkey, &cert.build())
}

/// Self-signed TLS 1.2 acceptor that insists on a client certificate, so
/// the handshake fails after the client has seen the server certificate.
pub fn client_auth_acceptor(common_name: &str, not_after: i64) -> SslAcceptor {
    let mut builder = self_signed(common_name, not_after);
    builder
        .set_max_proto_version(Some(SslVersion::TLS1_2))
        .unwrap();
    builder.set_verify(SslVerifyMode::PEER | SslVerifyMode::FAIL_IF_NO_PEER_CERT);
    builder.build()
}

/// A throwaway certificate authority.
pub struct TestCa {
    pub cert: X509,
    key: PKey<Private>,
}

impl TestCa {
    pub fn new(not_after: i64) -> Self {
        let key = ec_key();
        let name = name("certlife test CA");
        let mut cert = certificate_builder(&name, &key, not_after);
        cert.set_issuer_name(&name).unwrap();
        cert.append_extension(BasicConstraints::new().critical().ca().build().unwrap())
            .unwrap();
        cert.append_extension(
            KeyUsage::new()
                .critical()
                .key_cert_sign()
                .crl_sign()
                .build()
                .unwrap(),
        )
        .unwrap();
        cert.sign(&key, MessageDigest::sha256()).unwrap();
        TestCa {
            cert: cert.build(),
            key,
        }
    }

    /// The CA certificate as PEM, suitable for `ca_file`.
    pub fn pem(&self) -> Vec<u8> {
        self.cert.to_pem().unwrap()
    }

    /// TLS acceptor presenting a certificate for `hostname` issued by this CA.
    pub fn acceptor(&self, hostname: &str, not_after: i64) -> SslAcceptor {
        let pkey = ec_key();
        let mut cert = certificate_builder(&name(hostname), &pkey, not_after);
        cert.set_issuer_name(self.cert.subject_name()).unwrap();
        let san = SubjectAlternativeName::new()
            .dns(hostname)
            .build(&cert.x509v3_context(Some(&self.cert), None))
            .unwrap();
        cert.append_extension(san).unwrap();
        cert.sign(&self.key, MessageDigest::sha256()).unwrap();
        acceptor_builder(&pkey, &cert.build()).build()
    }
}

/// Binds an ephemeral port and serves exactly one connection with `handler`.
pub fn serve_once<F>(handler: F) -> SocketAddr
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            handler(stream);
        }
    });
    addr
}

/// Plain TLS from the first byte.
pub fn tls_server(acceptor: SslAcceptor) -> SocketAddr {
    serve_once(move |stream| {
        let _ = acceptor.accept(stream);
    })
}

/// SMTP server that advertises STARTTLS and answers the command with
/// `starttls_reply`. A 220 reply is followed by a TLS handshake.
pub fn smtp_server(acceptor: SslAcceptor, starttls_reply: &'static str) -> SocketAddr {
    serve_once(move |mut stream| {
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut line = String::new();

        stream.write_all(b"220 mail.test ESMTP\r\n").unwrap();
        reader.read_line(&mut line).unwrap();
        assert!(line.starts_with("EHLO "), "unexpected command {:?}", line);
        stream
            .write_all(b"250-mail.test\r\n250-PIPELINING\r\n250 STARTTLS\r\n")
            .unwrap();

        line.clear();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line, "STARTTLS\r\n");
        stream
            .write_all(format!("{}\r\n", starttls_reply).as_bytes())
            .unwrap();

        if starttls_reply.starts_with("220") {
            let _ = acceptor.accept(stream);
        } else {
            thread::sleep(Duration::from_millis(200));
        }
    })
}

fn read_until(stream: &mut TcpStream, token: &str) -> String {
    let mut seen = String::new();
    let mut buffer = [0u8; 512];
    while !seen.contains(token) {
        let n = stream.read(&mut buffer).unwrap_or(0);
        if n == 0 {
            break;
        }
        seen.push_str(&String::from_utf8_lossy(&buffer[..n]));
    }
    seen
}

/// XMPP server offering STARTTLS; answers with `<proceed/>` and a TLS
/// handshake when `proceed`, otherwise with `<failure/>`.
pub fn xmpp_server(acceptor: SslAcceptor, proceed: bool) -> SocketAddr {
    serve_once(move |mut stream| {
        let header = read_until(&mut stream, "version='1.0'>");
        assert!(header.contains("xmlns='jabber:client'"));
        stream
            .write_all(
                b"<?xml version='1.0'?><stream:stream xmlns='jabber:client' \
                  xmlns:stream='http://etherx.jabber.org/streams' id='1' from='chat.test' version='1.0'>\
                  <stream:features><starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'><required/></starttls>\
                  </stream:features>",
            )
            .unwrap();

        let request = read_until(&mut stream, "/>");
        assert!(request.contains("<starttls xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>"));
        if proceed {
            stream
                .write_all(b"<proceed xmlns='urn:ietf:params:xml:ns:xmpp-tls'/>")
                .unwrap();
            let _ = acceptor.accept(stream);
        } else {
            stream
                .write_all(b"<failure xmlns='urn:ietf:params:xml:ns:xmpp-tls'/></stream:stream>")
                .unwrap();
            thread::sleep(Duration::from_millis(200));
        }
    })
}

/// Accepts and then says nothing for `hold`.
pub fn silent_server(hold: Duration) -> SocketAddr {
    serve_once(move |stream| {
        thread::sleep(hold);
        drop(stream);
    })
}

/// Answers whatever arrives with an HTTP error, like a plaintext web server.
pub fn plaintext_server() -> SocketAddr {
    serve_once(|mut stream| {
        let mut buffer = [0u8; 1024];
        let _ = stream.read(&mut buffer);
        let _ = stream.write_all(b"HTTP/1.1 400 Bad Request\r\nConnection: close\r\n\r\n");
        thread::sleep(Duration::from_millis(200));
    })
}
