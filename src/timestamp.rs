use std::time::{SystemTime, UNIX_EPOCH};

/// Returns milliseconds since UNIX Epoch
pub fn now_msec() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Fix your clock :o")
        .as_millis() as u64
}

/// Current time rendered as RFC 3339, for persisted records
pub fn now_rfc3339() -> String {
    msec_to_rfc3339(now_msec())
}

pub fn msec_to_rfc3339(msec: u64) -> String {
    chrono::DateTime::from_timestamp_millis(msec as i64)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_renders_as_rfc3339() {
        assert_eq!(msec_to_rfc3339(0), "1970-01-01T00:00:00+00:00");
    }
}
