use chrono::{DateTime, SecondsFormat, Utc};

pub fn now_secs() -> i64 {
    Utc::now().timestamp()
}

/// Renders unix seconds as RFC 3339 for human-facing output.
pub fn format_timestamp(secs: i64) -> String {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|ts| ts.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| secs.to_string())
}
