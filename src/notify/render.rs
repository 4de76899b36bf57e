//! Message rendering for the three delivery media.

use crate::engine::Outcome;
use crate::store::models::ServiceInfo;

/// Display name used in email headers and voice scripts.
pub const EMAIL_NAME: &str = "AlerTea";

pub fn status_label(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Critical => "CRITICAL",
        Outcome::Resolved => "Resolved",
    }
}

/// Subject format: `AlerTea: {CRITICAL|Resolved} - {host}`.
pub fn subject(outcome: Outcome, host: &str) -> String {
    format!("{}: {} - {}", EMAIL_NAME, status_label(outcome), host)
}

/// Pull the checked port out of the collector's raw metadata.
///
/// The collector writes JSON-ish check configuration; the `"port": <digits>,`
/// fragment is the stable part across its versions, so that substring is all
/// we rely on.
pub fn extract_port(metadata: &str) -> Option<&str> {
    let start = metadata.find(r#""port":"#)? + r#""port":"#.len();
    let rest = metadata[start..].trim_start();

    let digits_end = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
    if digits_end == 0 || !rest[digits_end..].starts_with(',') {
        return None;
    }

    Some(&rest[..digits_end])
}

fn port_suffix(info: &ServiceInfo) -> String {
    match extract_port(&info.metadata) {
        Some(port) => format!(":{port}"),
        None => String::new(),
    }
}

pub fn email_body(outcome: Outcome, info: &ServiceInfo, fail_message: &str) -> String {
    let status = status_label(outcome);
    let host = &info.host;
    let service_type = info.service_type.as_str();
    let target = &info.target;
    let port = port_suffix(info);

    match outcome {
        Outcome::Critical => format!(
            r#"<h3>{status}: {host} - {service_type}:{target}{port}</h3>

<p>
Failure reason: {fail_message}
</p>
"#
        ),
        Outcome::Resolved => format!(
            r#"<h3>{status}: {host} - {service_type}:{target}{port}</h3>

<p>
The service is passing its checks again.
</p>
"#
        ),
    }
}

pub fn sms_text(outcome: Outcome, info: &ServiceInfo, fail_message: &str) -> String {
    let status = status_label(outcome);
    match outcome {
        Outcome::Critical => format!(
            "{} {}: {} {}:{} - {}",
            EMAIL_NAME, status, info.host, info.service_type, info.target, fail_message
        ),
        Outcome::Resolved => format!(
            "{} {}: {} {}:{}",
            EMAIL_NAME, status, info.host, info.service_type, info.target
        ),
    }
}

pub fn voice_script(outcome: Outcome, info: &ServiceInfo, fail_message: &str) -> String {
    match outcome {
        Outcome::Critical => format!(
            "This is {} calling. The {} check for {} on {} is critical. Reported failure: {}.",
            EMAIL_NAME, info.service_type, info.host, info.target, fail_message
        ),
        Outcome::Resolved => format!(
            "This is {} calling. The {} check for {} on {} has recovered.",
            EMAIL_NAME, info.service_type, info.host, info.target
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::ServiceType;

    fn info() -> ServiceInfo {
        ServiceInfo {
            id: 2,
            host: "myWeb1".to_string(),
            target: "webik.com".to_string(),
            port: 443,
            service_type: ServiceType::Tcp,
            fail_threshold: 5,
            interval_seconds: 30,
            metadata: r#"{"check": {"port": 443, "timeout": 5}}"#.to_string(),
        }
    }

    #[test]
    fn test_subject_format() {
        assert_eq!(subject(Outcome::Critical, "myWeb1"), "AlerTea: CRITICAL - myWeb1");
        assert_eq!(subject(Outcome::Resolved, "myWeb1"), "AlerTea: Resolved - myWeb1");
    }

    #[test]
    fn test_extract_port() {
        assert_eq!(extract_port(r#"{"check": {"port": 443, "timeout": 5}}"#), Some("443"));
        assert_eq!(extract_port(r#"{"port": 8080,"x":1}"#), Some("8080"));
        // no trailing comma means the fragment is not the pattern we know
        assert_eq!(extract_port(r#"{"port": 80}"#), None);
        assert_eq!(extract_port(r#"{"port": "443",}"#), None);
        assert_eq!(extract_port(r#"{"timeout": 5}"#), None);
        assert_eq!(extract_port(""), None);
    }

    #[test]
    fn test_critical_body_carries_failure_reason() {
        let body = email_body(Outcome::Critical, &info(), "check tcp: connection time out");

        assert!(body.contains("CRITICAL: myWeb1 - tcp:webik.com:443"));
        assert!(body.contains("Failure reason: check tcp: connection time out"));
    }

    #[test]
    fn test_resolved_body_has_no_failure_reason() {
        let body = email_body(Outcome::Resolved, &info(), "stale message");

        assert!(body.contains("Resolved: myWeb1 - tcp:webik.com:443"));
        assert!(!body.contains("stale message"));
        assert!(!body.contains("Failure reason"));
    }

    #[test]
    fn test_port_omitted_when_metadata_has_none() {
        let mut icmp = info();
        icmp.metadata = r#"{"check": {"timeout": 3}}"#.to_string();

        let body = email_body(Outcome::Critical, &icmp, "no reply");
        assert!(body.contains("tcp:webik.com</h3>"));
    }

    #[test]
    fn test_sms_text_is_short_and_specific() {
        let text = sms_text(Outcome::Critical, &info(), "connection refused");
        assert_eq!(text, "AlerTea CRITICAL: myWeb1 tcp:webik.com - connection refused");

        let text = sms_text(Outcome::Resolved, &info(), "");
        assert_eq!(text, "AlerTea Resolved: myWeb1 tcp:webik.com");
    }

    #[test]
    fn test_voice_script_reads_as_a_sentence() {
        let script = voice_script(Outcome::Critical, &info(), "connection refused");
        assert!(script.starts_with("This is AlerTea calling."));
        assert!(script.contains("myWeb1"));
        assert!(script.ends_with("connection refused."));
    }
}
