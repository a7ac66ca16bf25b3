use std::time::Duration;

use clap::Args;
use serde::{Deserialize, Serialize};

use crate::error::HeartbeatError;

pub const DEFAULT_BEAT_PERIOD: &str = "3s";
pub const DEFAULT_RECONNECT_PERIOD: &str = "10s";

/// Heartbeat section of a node's configuration, as written by the operator.
///
/// Can be loaded from a config file (camelCase keys) or flattened into a
/// launcher's command line. Durations stay strings here and are checked by
/// [`HeartbeatConfig::validate`].
#[derive(Args, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeartbeatConfig {
    /// Aggregator multiaddr, ending in /p2p/<PeerId>.
    /// Example: /ip4/10.0.0.5/tcp/9100/p2p/12D3KooW...
    #[arg(long = "heartbeat-target", env = "PULSE_HEARTBEAT_TARGET", default_value = "")]
    pub beat_target: String,

    /// Interval between status reports (e.g. "3s", "1m30s").
    #[arg(long = "heartbeat-period", env = "PULSE_HEARTBEAT_PERIOD", default_value = DEFAULT_BEAT_PERIOD)]
    pub beat_period: String,

    /// Interval between reconnect attempts while the aggregator is unreachable.
    #[arg(
        long = "heartbeat-reconnect-period",
        env = "PULSE_HEARTBEAT_RECONNECT_PERIOD",
        default_value = DEFAULT_RECONNECT_PERIOD
    )]
    pub reconnect_period: String,

    /// Free-form label included in every report.
    #[arg(long = "heartbeat-nickname", env = "PULSE_HEARTBEAT_NICKNAME", default_value = "")]
    pub nickname: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            beat_target: String::new(),
            beat_period: DEFAULT_BEAT_PERIOD.to_string(),
            reconnect_period: DEFAULT_RECONNECT_PERIOD.to_string(),
            nickname: String::new(),
        }
    }
}

impl HeartbeatConfig {
    /// Parse the duration fields. The target is not checked here: an empty
    /// or malformed target surfaces as a connect failure instead.
    pub fn validate(&self) -> Result<HeartbeatSettings, HeartbeatError> {
        let beat_period = parse_duration(&self.beat_period)
            .map_err(|e| HeartbeatError::config(format!("beatPeriod: {e}")))?;
        let reconnect_period = parse_duration(&self.reconnect_period)
            .map_err(|e| HeartbeatError::config(format!("reconnectPeriod: {e}")))?;
        Ok(HeartbeatSettings {
            target: self.beat_target.clone(),
            beat_period,
            reconnect_period,
            nickname: self.nickname.clone(),
        })
    }
}

/// Validated, immutable heartbeat settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatSettings {
    pub target: String,
    pub beat_period: Duration,
    pub reconnect_period: Duration,
    pub nickname: String,
}

// ============================================================================
// Duration strings
// ============================================================================

/// Parse a duration such as "3s", "250ms", "1.5s" or "2h45m".
///
/// Accepts a sequence of decimal numbers, each followed by one of
/// `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. Zero and negative durations
/// are rejected since neither makes sense as a period.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let s = input.trim();
    if s.is_empty() {
        return Err("empty duration".into());
    }
    if s.starts_with('-') {
        return Err(format!("negative duration '{input}'"));
    }
    let mut rest = s.strip_prefix('+').unwrap_or(s);
    if rest.is_empty() {
        return Err(format!("invalid duration '{input}'"));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let num_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        if num_len == 0 {
            return Err(format!("invalid duration '{input}': expected a number"));
        }
        let (number, tail) = rest.split_at(num_len);

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        if unit_len == 0 {
            return Err(format!("missing unit in duration '{input}'"));
        }
        let (unit, tail) = tail.split_at(unit_len);

        let nanos_per_unit: u128 = match unit {
            "ns" => 1,
            "us" | "µs" | "μs" => 1_000,
            "ms" => 1_000_000,
            "s" => 1_000_000_000,
            "m" => 60 * 1_000_000_000,
            "h" => 3_600 * 1_000_000_000,
            other => return Err(format!("unknown unit '{other}' in duration '{input}'")),
        };

        let nanos = scale_decimal(number, nanos_per_unit)
            .ok_or_else(|| format!("invalid duration '{input}'"))?;
        total = total
            .checked_add(nanos)
            .ok_or_else(|| format!("duration '{input}' overflows"))?;
        rest = tail;
    }

    if total == 0 {
        return Err(format!("duration '{input}' must be greater than zero"));
    }
    let nanos = u64::try_from(total).map_err(|_| format!("duration '{input}' overflows"))?;
    Ok(Duration::from_nanos(nanos))
}

/// `number` (digits with at most one '.') times `scale`, truncated to whole nanoseconds.
fn scale_decimal(number: &str, scale: u128) -> Option<u128> {
    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if frac_part.contains('.') {
        return None;
    }

    let whole: u128 = if int_part.is_empty() { 0 } else { int_part.parse().ok()? };
    let mut nanos = whole.checked_mul(scale)?;

    // Digits past 18 cannot contribute a whole nanosecond at any unit here.
    let frac_digits = &frac_part[..frac_part.len().min(18)];
    if !frac_digits.is_empty() {
        let frac: u128 = frac_digits.parse().ok()?;
        let denom = 10u128.pow(frac_digits.len() as u32);
        nanos = nanos.checked_add(frac * scale / denom)?;
    }
    Some(nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parses_common_durations() {
        assert_eq!(parse_duration("3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1m30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("1.5s").unwrap(), Duration::from_millis(1_500));
        assert_eq!(parse_duration("2h45m").unwrap(), Duration::from_secs(9_900));
        assert_eq!(parse_duration("10us").unwrap(), Duration::from_micros(10));
        assert_eq!(parse_duration("7µs").unwrap(), Duration::from_micros(7));
        assert_eq!(parse_duration("+.5m").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration(" 42ns ").unwrap(), Duration::from_nanos(42));
    }

    #[test]
    fn rejects_malformed_durations() {
        for bad in ["", "3", "s", "3x", "-3s", "0s", "0.0h", "1..5s", ".s", "3s5", "+"] {
            assert!(parse_duration(bad).is_err(), "'{bad}' should be rejected");
        }
    }

    #[test]
    fn defaults_match_documented_values() {
        let settings = HeartbeatConfig::default().validate().unwrap();
        assert_eq!(settings.beat_period, Duration::from_secs(3));
        assert_eq!(settings.reconnect_period, Duration::from_secs(10));
        assert!(settings.target.is_empty());
    }

    #[test]
    fn bad_period_is_config_error() {
        let config = HeartbeatConfig { beat_period: "soon".into(), ..Default::default() };
        assert!(matches!(config.validate(), Err(HeartbeatError::Config(_))));

        let config = HeartbeatConfig { reconnect_period: "10".into(), ..Default::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("reconnectPeriod"));
    }

    #[test]
    fn empty_target_is_not_a_config_error() {
        let config = HeartbeatConfig { beat_target: String::new(), ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn loads_from_config_file_section() {
        let json = r#"{
            "beatTarget": "/ip4/127.0.0.1/tcp/9100",
            "beatPeriod": "1s",
            "nickname": "BobHoblaw"
        }"#;
        let config: HeartbeatConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.beat_target, "/ip4/127.0.0.1/tcp/9100");
        assert_eq!(config.beat_period, "1s");
        assert_eq!(config.reconnect_period, DEFAULT_RECONNECT_PERIOD);
        assert_eq!(config.nickname, "BobHoblaw");
    }

    #[derive(Parser, Debug)]
    struct Launcher {
        #[command(flatten)]
        heartbeat: HeartbeatConfig,
    }

    #[test]
    fn flattens_into_a_launcher() {
        let cli = Launcher::parse_from([
            "node",
            "--heartbeat-period",
            "5s",
            "--heartbeat-nickname",
            "alice",
        ]);
        assert_eq!(cli.heartbeat.beat_period, "5s");
        assert_eq!(cli.heartbeat.nickname, "alice");
        assert_eq!(cli.heartbeat.reconnect_period, DEFAULT_RECONNECT_PERIOD);
    }
}
