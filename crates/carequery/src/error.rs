//! Failure taxonomy for data-service errors.
//!
//! Classification is by cause, read from the error's message text, not by
//! concrete error type — the engine cannot see past the service boundary.

/// Recovery suggestions attached to every degraded response.
pub const RECOVERY_FOLLOW_UPS: &[&str] = &[
    "Try asking again",
    "Ask a general question instead",
    "Check the dashboard for raw numbers",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Timeout,
    NotFound,
    Unauthorized,
    Unknown,
}

impl FailureKind {
    /// Classify a service failure from its message chain.
    pub fn classify(err: &anyhow::Error) -> Self {
        let msg = format!("{err:#}").to_lowercase();
        if msg.contains("timeout") || msg.contains("timed out") {
            FailureKind::Timeout
        } else if msg.contains("network")
            || msg.contains("connection")
            || msg.contains("unreachable")
        {
            FailureKind::Network
        } else if msg.contains("not found") || msg.contains("404") || msg.contains("missing") {
            FailureKind::NotFound
        } else if msg.contains("unauthorized")
            || msg.contains("forbidden")
            || msg.contains("401")
            || msg.contains("403")
        {
            FailureKind::Unauthorized
        } else {
            FailureKind::Unknown
        }
    }

    /// Category key used to select the matching error template.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Network => "network",
            FailureKind::Timeout => "timeout",
            FailureKind::NotFound => "not_found",
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ServiceError;

    #[test]
    fn classifies_by_message_text() {
        let cases = [
            ("request timed out after 30s", FailureKind::Timeout),
            ("connection refused by host", FailureKind::Network),
            ("client 42 not found", FailureKind::NotFound),
            ("403 forbidden", FailureKind::Unauthorized),
            ("disk exploded", FailureKind::Unknown),
        ];
        for (msg, expected) in cases {
            let err = anyhow::anyhow!("{msg}");
            assert_eq!(FailureKind::classify(&err), expected, "for {msg:?}");
        }
    }

    #[test]
    fn classifies_wrapped_service_errors() {
        let err = anyhow::Error::from(ServiceError::Timeout("budget fetch".into()))
            .context("get_budget_analysis failed");
        assert_eq!(FailureKind::classify(&err), FailureKind::Timeout);
    }
}
