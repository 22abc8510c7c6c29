//! Scalar parsers shared by every configuration source.

use std::time::Duration;

use super::ConfigError;

/// Parses a flush period.
///
/// Accepts human-readable durations (`"10s"`, `"1m30s"`, `"500ms"`) and bare
/// integers, which are read as milliseconds.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidDuration`] carrying the raw value.
///
/// # Examples
///
/// ```
/// use shared::config::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
/// assert_eq!(parse_duration("250").unwrap(), Duration::from_millis(250));
/// assert!(parse_duration("d").is_err());
/// ```
pub fn parse_duration(raw: &str) -> Result<Duration, ConfigError> {
    let trimmed = raw.trim();
    if let Ok(millis) = trimmed.parse::<u64>() {
        return Ok(Duration::from_millis(millis));
    }
    humantime::parse_duration(trimmed).map_err(|source| ConfigError::InvalidDuration {
        value: raw.to_string(),
        source,
    })
}

/// Parses a boolean flag.
///
/// Accepts `1`, `t`, `T`, `true`, `TRUE`, `True` and their false
/// counterparts `0`, `f`, `F`, `false`, `FALSE`, `False`.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidBool`] naming the field and raw value.
pub fn parse_bool(field: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            field: field.to_string(),
            value: raw.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_units() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration(" 1s ").unwrap(), Duration::from_secs(1));
    }

    #[test]
    fn test_parse_duration_bare_millis() {
        assert_eq!(parse_duration("1500").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn test_parse_duration_error_names_value() {
        let err = parse_duration("d").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDuration { ref value, .. } if value == "d"));
        assert!(err.to_string().contains("duration"));
        assert!(err.to_string().contains("'d'"));
    }

    #[test]
    fn test_parse_bool_accepted_forms() {
        for raw in ["1", "t", "T", "true", "TRUE", "True"] {
            assert!(parse_bool("flag", raw).unwrap(), "{raw}");
        }
        for raw in ["0", "f", "F", "false", "FALSE", "False"] {
            assert!(!parse_bool("flag", raw).unwrap(), "{raw}");
        }
    }

    #[test]
    fn test_parse_bool_rejects_garbage() {
        let err = parse_bool("insecureSkipTLSVerify", "d").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("insecureSkipTLSVerify"));
        assert!(message.contains("'d'"));
        assert!(parse_bool("flag", "yes").is_err());
    }
}
