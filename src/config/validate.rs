// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{RalphError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = RalphError;

    /// Validate a raw config and resolve its duration strings.
    ///
    /// This checks:
    /// - `state_dir` is not empty
    /// - `retention` and `kill_grace` parse as durations
    /// - `kill_grace` is non-zero (a zero grace would skip SIGTERM entirely)
    fn try_from(raw: RawConfigFile) -> Result<Self> {
        let section = raw.ralph;

        if section.state_dir.as_os_str().is_empty() {
            return Err(RalphError::ConfigError(
                "[ralph].state_dir must not be empty".to_string(),
            ));
        }

        let retention = parse_duration(&section.retention).map_err(|e| {
            RalphError::ConfigError(format!("invalid [ralph].retention: {e}"))
        })?;

        let kill_grace = parse_duration(&section.kill_grace).map_err(|e| {
            RalphError::ConfigError(format!("invalid [ralph].kill_grace: {e}"))
        })?;
        if kill_grace.is_zero() {
            return Err(RalphError::ConfigError(
                "[ralph].kill_grace must be greater than zero".to_string(),
            ));
        }

        Ok(ConfigFile {
            state_dir: section.state_dir,
            default_timeout: section.default_timeout,
            retention,
            kill_grace,
        })
    }
}

/// Parse a simple duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"`, `"7d"`.
pub fn parse_duration(s: &str) -> std::result::Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    // Find the boundary between digits and suffix.
    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    let secs = |mult: u64| {
        value
            .checked_mul(mult)
            .map(Duration::from_secs)
            .ok_or_else(|| format!("duration '{s}' is too large"))
    };

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => secs(1),
        "m" => secs(60),
        "h" => secs(60 * 60),
        "d" => secs(24 * 60 * 60),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, h or d",
            unit
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::RalphSection;

    #[test]
    fn parses_supported_units() {
        assert_eq!(parse_duration("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(parse_duration(" 3s "), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("90m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("24h"), Ok(Duration::from_secs(86_400)));
        assert_eq!(parse_duration("7d"), Ok(Duration::from_secs(604_800)));
    }

    #[test]
    fn rejects_malformed_durations() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("15").is_err());
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("3 weeks").is_err());
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg = ConfigFile::try_from(RawConfigFile::default()).unwrap();
        assert_eq!(cfg, ConfigFile::default());
        assert_eq!(cfg.retention, Duration::from_secs(24 * 60 * 60));
        assert_eq!(cfg.kill_grace, Duration::from_secs(2));
        assert_eq!(cfg.default_timeout, None);
    }

    #[test]
    fn zero_grace_is_a_config_error() {
        let raw = RawConfigFile {
            ralph: RalphSection {
                kill_grace: "0s".to_string(),
                ..RalphSection::default()
            },
        };
        match ConfigFile::try_from(raw) {
            Err(RalphError::ConfigError(msg)) => assert!(msg.contains("kill_grace")),
            other => panic!("expected ConfigError, got {other:?}"),
        }
    }

    #[test]
    fn explicit_timeout_overrides_default_and_zero_disables() {
        let cfg = ConfigFile {
            default_timeout: Some(300),
            ..ConfigFile::default()
        };
        assert_eq!(cfg.effective_timeout(None), Some(300));
        assert_eq!(cfg.effective_timeout(Some(5)), Some(5));
        assert_eq!(cfg.effective_timeout(Some(0)), None);
        assert_eq!(ConfigFile::default().effective_timeout(None), None);
    }
}
