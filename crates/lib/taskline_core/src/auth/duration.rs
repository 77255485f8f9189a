//! Token lifetime strings such as `"15m"` or `"7d"`.

use chrono::Duration;
use tracing::warn;

/// Fallback access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;

/// Fallback refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Parse `<n><unit>` where unit is one of `s`, `m`, `h`, `d`, `w`.
/// A bare number is read as seconds. Zero and negative values are rejected.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.trim();
    let split = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    let (digits, unit) = input.split_at(split);
    let n: i64 = digits.parse().ok()?;
    if n <= 0 {
        return None;
    }
    match unit {
        "" | "s" => Duration::try_seconds(n),
        "m" => Duration::try_minutes(n),
        "h" => Duration::try_hours(n),
        "d" => Duration::try_days(n),
        "w" => Duration::try_weeks(n),
        _ => None,
    }
}

/// Parse a configured lifetime, falling back to `default_secs` with a warning.
pub fn resolve_ttl(label: &str, input: &str, default_secs: i64) -> Duration {
    let default = Duration::seconds(default_secs);
    match parse_duration(input) {
        Some(d) => d,
        None => {
            warn!(
                setting = label,
                value = input,
                fallback_secs = default.num_seconds(),
                "malformed token lifetime, using default"
            );
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_units() {
        assert_eq!(parse_duration("30s"), Some(Duration::seconds(30)));
        assert_eq!(parse_duration("15m"), Some(Duration::minutes(15)));
        assert_eq!(parse_duration("12h"), Some(Duration::hours(12)));
        assert_eq!(parse_duration("7d"), Some(Duration::days(7)));
        assert_eq!(parse_duration("2w"), Some(Duration::weeks(2)));
        assert_eq!(parse_duration("900"), Some(Duration::seconds(900)));
        assert_eq!(parse_duration(" 1h "), Some(Duration::hours(1)));
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "m", "15x", "1.5h", "-3d", "0m", "7 d", "d7"] {
            assert_eq!(parse_duration(bad), None, "accepted {bad:?}");
        }
    }

    #[test]
    fn resolve_falls_back_to_default() {
        assert_eq!(
            resolve_ttl("access", "soon", DEFAULT_ACCESS_TTL_SECS),
            Duration::minutes(15)
        );
        assert_eq!(
            resolve_ttl("refresh", "", DEFAULT_REFRESH_TTL_SECS),
            Duration::days(7)
        );
        assert_eq!(resolve_ttl("access", "5m", DEFAULT_ACCESS_TTL_SECS), Duration::minutes(5));
    }
}
