//! Full checks against in-process servers.

mod common;

use std::io::Write;
use std::time::{Duration, Instant};

use certlife::report::{OutputFormat, Reporter};
use certlife::{
    CheckOptions, CheckResult, Checker, ConnectionError, HandshakeError, Status, Strategy, Target,
};

use common::{acceptor, TestCa, JAN_2030};
use tempfile::NamedTempFile;

fn checker(timeout: Duration, verify: bool) -> Checker {
    Checker::new(CheckOptions {
        timeout,
        verify,
        ehlo_name: "certlife.test".to_string(),
        ca_file: None,
    })
}

/// A verifying checker that trusts `ca`, plus the bundle file backing it.
fn trusting(ca: &TestCa) -> (Checker, NamedTempFile) {
    let mut bundle = NamedTempFile::new().unwrap();
    bundle.write_all(&ca.pem()).unwrap();
    let checker = Checker::new(CheckOptions {
        timeout: Duration::from_secs(5),
        verify: true,
        ehlo_name: "certlife.test".to_string(),
        ca_file: Some(bundle.path().to_path_buf()),
    });
    (checker, bundle)
}

fn insecure() -> Checker {
    checker(Duration::from_secs(5), false)
}

#[test]
fn test_direct_tls_reports_expiry() {
    let addr = common::tls_server(acceptor("example.test", JAN_2030));
    let target = Target::new("example.test", 443, Strategy::DirectTls).with_connect_addr(addr);

    let result = insecure().check(&target);
    let expiry = result.expiry().expect("expected a successful check");
    assert_eq!(expiry.formatted(), "01. January 2030, 00:00");
    assert_eq!(expiry.not_after.timestamp(), JAN_2030);
}

#[test]
fn test_direct_tls_untrusted_certificate() {
    let addr = common::tls_server(acceptor("example.test", JAN_2030));
    let target = Target::new("example.test", 443, Strategy::DirectTls).with_connect_addr(addr);

    let result = checker(Duration::from_secs(5), true).check(&target);
    match result {
        CheckResult::HandshakeFailure(HandshakeError::VerificationFailed { .. }) => {}
        other => panic!("expected verification failure, got {:?}", other),
    }
}

#[test]
fn test_verified_direct_tls_reports_expiry() {
    let ca = TestCa::new(JAN_2030);
    let addr = common::tls_server(ca.acceptor("example.test", JAN_2030));
    let target = Target::new("example.test", 443, Strategy::DirectTls).with_connect_addr(addr);

    let (checker, _bundle) = trusting(&ca);
    let result = checker.check(&target);
    assert!(result.is_success(), "got {:?}", result);
    assert_eq!(result.expiry().unwrap().not_after.timestamp(), JAN_2030);
}

#[test]
fn test_verified_smtp_starttls_reports_expiry() {
    let ca = TestCa::new(JAN_2030);
    let addr = common::smtp_server(ca.acceptor("mail.test", JAN_2030), "220 Ready");
    let target = Target::new("mail.test", 25, Strategy::StartTlsSmtp).with_connect_addr(addr);

    let (checker, _bundle) = trusting(&ca);
    let result = checker.check(&target);
    assert!(result.is_success(), "got {:?}", result);
}

#[test]
fn test_trusted_ca_with_wrong_hostname() {
    let ca = TestCa::new(JAN_2030);
    let addr = common::tls_server(ca.acceptor("other.test", JAN_2030));
    let target = Target::new("example.test", 443, Strategy::DirectTls).with_connect_addr(addr);

    let (checker, _bundle) = trusting(&ca);
    let result = checker.check(&target);
    assert_eq!(result.failure_kind(), Some("verification-failed"), "{:?}", result);
}

#[test]
fn test_insecure_failure_after_untrusted_certificate_is_negotiation() {
    let addr = common::tls_server(common::client_auth_acceptor("example.test", JAN_2030));
    let target = Target::new("example.test", 443, Strategy::DirectTls).with_connect_addr(addr);

    let result = insecure().check(&target);
    assert!(
        matches!(
            result,
            CheckResult::HandshakeFailure(HandshakeError::NegotiationFailed { .. })
        ),
        "got {:?}",
        result
    );
}

#[test]
fn test_smtp_starttls_reports_expiry() {
    let addr = common::smtp_server(acceptor("mail.test", JAN_2030), "220 2.0.0 Ready to start TLS");
    let target = Target::new("mail.test", 25, Strategy::StartTlsSmtp).with_connect_addr(addr);

    let result = insecure().check(&target);
    assert!(result.is_success(), "got {:?}", result);
    assert_eq!(result.expiry().unwrap().not_after.timestamp(), JAN_2030);
}

#[test]
fn test_smtp_starttls_not_available() {
    let addr = common::smtp_server(acceptor("mail.test", JAN_2030), "454 TLS not available");
    let target = Target::new("mail.test", 25, Strategy::StartTlsSmtp).with_connect_addr(addr);

    let result = insecure().check(&target);
    match &result {
        CheckResult::ConnectionFailure(ConnectionError::ProtocolRejected { strategy, details }) => {
            assert_eq!(*strategy, Strategy::StartTlsSmtp);
            assert!(details.contains("454 TLS not available"));
        }
        other => panic!("expected protocol rejection, got {:?}", other),
    }
}

#[test]
fn test_xmpp_starttls_reports_expiry() {
    let addr = common::xmpp_server(acceptor("chat.test", JAN_2030), true);
    let target = Target::new("chat.test", 5222, Strategy::StartTlsXmpp).with_connect_addr(addr);

    let result = insecure().check(&target);
    assert!(result.is_success(), "got {:?}", result);
    assert_eq!(
        result.expiry().unwrap().formatted(),
        "01. January 2030, 00:00"
    );
}

#[test]
fn test_xmpp_starttls_failure() {
    let addr = common::xmpp_server(acceptor("chat.test", JAN_2030), false);
    let target = Target::new("chat.test", 5222, Strategy::StartTlsXmpp).with_connect_addr(addr);

    let result = insecure().check(&target);
    assert_eq!(result.failure_kind(), Some("protocol-rejected"));
}

#[test]
fn test_silent_servers_never_hang() {
    let timeout = Duration::from_millis(500);
    for strategy in [Strategy::StartTlsSmtp, Strategy::StartTlsXmpp] {
        let addr = common::silent_server(Duration::from_secs(3));
        let target = Target::new("quiet.test", strategy.default_port(), strategy)
            .with_connect_addr(addr);

        let started = Instant::now();
        let result = checker(timeout, false).check(&target);
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(result.failure_kind(), Some("protocol-rejected"), "{:?}", strategy);
    }

    let addr = common::silent_server(Duration::from_secs(3));
    let target = Target::new("quiet.test", 443, Strategy::DirectTls).with_connect_addr(addr);
    let started = Instant::now();
    let result = checker(timeout, false).check(&target);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(matches!(
        result,
        CheckResult::HandshakeFailure(HandshakeError::Timeout)
    ));
}

#[test]
fn test_plaintext_endpoint_fails_negotiation() {
    let addr = common::plaintext_server();
    let target = Target::new("www.test", 443, Strategy::DirectTls).with_connect_addr(addr);

    let result = insecure().check(&target);
    assert!(
        matches!(
            result,
            CheckResult::HandshakeFailure(HandshakeError::NegotiationFailed { .. })
        ),
        "got {:?}",
        result
    );
}

#[test]
fn test_unreachable_host_is_connection_failure() {
    let target = Target::new("unreachable.test", 443, Strategy::DirectTls)
        .with_connect_addr("192.0.2.1:443".parse().unwrap());
    let started = Instant::now();
    let result = checker(Duration::from_millis(500), true).check(&target);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(result.status(), Status::ConnectionFailure);
}

#[test]
fn test_batch_reports_in_input_order() {
    let slow = common::silent_server(Duration::from_secs(3));
    let targets = vec![
        Target::new("slow.test", 443, Strategy::DirectTls).with_connect_addr(slow),
        Target::new("example.test", 443, Strategy::DirectTls)
            .with_connect_addr(common::tls_server(acceptor("example.test", JAN_2030))),
        Target::new("mail.test", 25, Strategy::StartTlsSmtp).with_connect_addr(common::smtp_server(
            acceptor("mail.test", JAN_2030),
            "454 TLS not available",
        )),
        Target::new("chat.test", 5222, Strategy::StartTlsXmpp)
            .with_connect_addr(common::xmpp_server(acceptor("chat.test", JAN_2030), true)),
    ];

    let reports = checker(Duration::from_secs(1), false).check_all(&targets, 4);
    let statuses: Vec<Status> = reports.iter().map(|r| r.result.status()).collect();
    assert_eq!(
        statuses,
        vec![
            Status::HandshakeFailure,
            Status::Ok,
            Status::ConnectionFailure,
            Status::Ok
        ]
    );
    for (report, target) in reports.iter().zip(&targets) {
        assert_eq!(&report.target, target);
    }

    let mut reporter = Reporter::new(OutputFormat::Text, false);
    let text = reporter.render(&reports);
    assert!(text.contains(
        "The Certificate for example.test on port 443 expires on\n\t01. January 2030, 00:00."
    ));
    assert!(text.contains("Failed to check mail.test on port 25"));

    reporter.format = OutputFormat::Json;
    let json: serde_json::Value = serde_json::from_str(&reporter.render(&reports)).unwrap();
    assert_eq!(json.as_array().unwrap().len(), 4);
}
