use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use log::{debug, warn};
use prometheus::{labels, register_gauge, Gauge};

use certlife::CheckReport;

lazy_static! {
    static ref CERTLIFE_DAYS_BEFORE_EXPIRED: Gauge =
        register_gauge!("certlife_days_before_expired", "days before expiration").unwrap();
    static ref CERTLIFE_CHECK_SUCCESS: Gauge = register_gauge!(
        "certlife_check_success",
        "1 if the certificate could be retrieved and decoded"
    )
    .unwrap();
}

/// Function to push metrics to prometheus
/// # Arguments
/// * `reports` - Check reports, one push per target
/// * `prometheus_address` - Push gateway base address
/// * `now` - Reference time for days before expiration
pub fn prometheus_metrics(reports: &[CheckReport], prometheus_address: &str, now: DateTime<Utc>) {
    for report in reports {
        let days = report
            .result
            .expiry()
            .map(|expiry| expiry.days_remaining(now) as f64)
            .unwrap_or(0.0);
        CERTLIFE_DAYS_BEFORE_EXPIRED.set(days);
        CERTLIFE_CHECK_SUCCESS.set(if report.result.is_success() { 1.0 } else { 0.0 });

        let metric_families = prometheus::gather();
        let pushed = prometheus::push_metrics(
            "certlife",
            labels! {
                "instance".to_owned() => "certlife".to_owned(),
                "host".to_owned() => report.target.hostname.to_owned(),
                "port".to_owned() => report.target.port.to_string(),
                "strategy".to_owned() => report.target.strategy.to_string(),
                "status".to_owned() => report.result.failure_kind().unwrap_or("ok").to_owned(),
            },
            &format!("{}/metrics/job", prometheus_address),
            metric_families,
            None,
        );

        match pushed {
            Ok(_) => debug!("pushed metrics for {}", report.target),
            Err(e) => warn!("failed to push metrics to prometheus: {}", e),
        }
    }
}
