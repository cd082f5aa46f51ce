//! Shortcut configuration parsing.
//!
//! Routes arm a breaker with a single comma-separated string whose fields are
//! positional:
//!
//! ```text
//! name,fallbackUri[,statusCodes[,failureRateThreshold[,waitIntervalInOpenState]]]
//! cbName,forward:/fallback-url/endpoint,404:500,33,2m
//! ```
//!
//! # Status code tokens
//! Multiple codes are separated by `;`. Inside one code, `:` splits the token
//! into its literal parts: `404:500` means exactly `{"404", "500"}`, never the
//! numeric range 404..=500. The `min:max` look of that syntax is most likely a
//! naming accident upstream, but existing route definitions rely on the literal
//! split, so it is kept as is.
//!
//! # Durations
//! A bare integer is milliseconds; anything else uses the `humantime` grammar
//! (`500ms`, `33s`, `2m`, `1h 30m`). Zero is rejected.

use std::collections::BTreeSet;
use std::time::Duration;

use crate::resilience::policy::{BreakerPolicy, ConfigError};

/// Positional field names, in order.
pub const SHORTCUT_FIELD_ORDER: [&str; 5] = [
    "name",
    "fallbackUri",
    "statusCodes",
    "failureRateThreshold",
    "waitIntervalInOpenState",
];

const STATUS_CODE_SEPARATOR: char = ';';
const STATUS_RANGE_SEPARATOR: char = ':';

/// Parse a comma-separated shortcut string into a policy.
pub fn parse_shortcut(shortcut: &str) -> Result<BreakerPolicy, ConfigError> {
    let tokens: Vec<&str> = shortcut.split(',').collect();
    parse_shortcut_fields(&tokens)
}

/// Parse already-split positional tokens into a policy.
pub fn parse_shortcut_fields(tokens: &[&str]) -> Result<BreakerPolicy, ConfigError> {
    if tokens.len() > SHORTCUT_FIELD_ORDER.len() {
        return Err(ConfigError::TooManyFields {
            max: SHORTCUT_FIELD_ORDER.len(),
            got: tokens.len(),
        });
    }

    let field = |index: usize| {
        tokens
            .get(index)
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
    };

    let name = field(0).ok_or(ConfigError::MissingField("name"))?;
    let fallback = field(1).ok_or(ConfigError::MissingField("fallbackUri"))?;

    let mut policy = BreakerPolicy::new(name, fallback)?;

    if let Some(codes) = field(2) {
        policy = policy.with_status_codes(parse_status_codes(codes));
    }
    if let Some(threshold) = field(3) {
        policy = policy.with_failure_rate_threshold(parse_failure_rate_threshold(threshold)?)?;
    }
    if let Some(wait) = field(4) {
        policy = policy.with_wait_duration_open(parse_duration(wait)?)?;
    }

    Ok(policy)
}

/// Split a status-code token into its literal codes.
pub fn parse_status_codes(token: &str) -> BTreeSet<String> {
    expand_status_codes(token.split(STATUS_CODE_SEPARATOR))
}

/// Apply the `:` literal split to each entry of an already separated list.
pub fn expand_status_codes<I, S>(entries: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries
        .into_iter()
        .flat_map(|entry| {
            entry
                .as_ref()
                .split(STATUS_RANGE_SEPARATOR)
                .map(|code| code.trim().to_string())
                .collect::<Vec<_>>()
        })
        .filter(|code| !code.is_empty())
        .collect()
}

/// Parse a percentage in (0, 100].
pub fn parse_failure_rate_threshold(token: &str) -> Result<f32, ConfigError> {
    let invalid = || ConfigError::InvalidNumber {
        value: token.to_string(),
    };
    let value: f32 = token.trim().parse().map_err(|_| invalid())?;
    if value.is_finite() && value > 0.0 && value <= 100.0 {
        Ok(value)
    } else {
        Err(invalid())
    }
}

/// Parse a positive duration literal.
pub fn parse_duration(token: &str) -> Result<Duration, ConfigError> {
    let token = token.trim();
    let invalid = || ConfigError::InvalidDuration {
        value: token.to_string(),
    };

    let duration = if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) {
        Duration::from_millis(token.parse().map_err(|_| invalid())?)
    } else {
        humantime::parse_duration(token).map_err(|_| invalid())?
    };

    if duration.is_zero() {
        return Err(invalid());
    }
    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mandatory_only() {
        let policy = parse_shortcut("a,b").unwrap();
        assert_eq!(policy.name(), "a");
        assert_eq!(policy.fallback_destination(), "b");
        assert!(policy.matched_status_codes().is_empty());
        assert_eq!(policy.failure_rate_threshold(), None);
        assert_eq!(policy.wait_duration_open(), None);
    }

    #[test]
    fn test_full_shortcut() {
        let policy = parse_shortcut("cbName,forward:/fallback-url/endpoint,404:500,33,2m").unwrap();
        assert_eq!(policy.name(), "cbName");
        assert_eq!(policy.fallback_destination(), "forward:/fallback-url/endpoint");
        assert_eq!(policy.failure_rate_threshold(), Some(33.0));
        assert_eq!(policy.wait_duration_open(), Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_range_is_split_literally() {
        let policy = parse_shortcut("a,b,404:500").unwrap();
        let expected: BTreeSet<String> = ["404", "500"].iter().map(|s| s.to_string()).collect();
        assert_eq!(policy.matched_status_codes(), &expected);
    }

    #[test]
    fn test_multiple_status_codes() {
        let codes = parse_status_codes("404:500;503; ;BAD_GATEWAY");
        let codes: Vec<_> = codes.iter().map(String::as_str).collect();
        assert_eq!(codes, vec!["404", "500", "503", "BAD_GATEWAY"]);
    }

    #[test]
    fn test_missing_fields() {
        assert_eq!(parse_shortcut("").unwrap_err(), ConfigError::MissingField("name"));
        assert_eq!(parse_shortcut("a").unwrap_err(), ConfigError::MissingField("fallbackUri"));
        assert_eq!(parse_shortcut("a, ").unwrap_err(), ConfigError::MissingField("fallbackUri"));
        assert_eq!(parse_shortcut(",b").unwrap_err(), ConfigError::MissingField("name"));
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(matches!(
            parse_shortcut("a,b,x,150").unwrap_err(),
            ConfigError::InvalidNumber { .. }
        ));
        assert!(matches!(
            parse_shortcut("a,b,x,0").unwrap_err(),
            ConfigError::InvalidNumber { .. }
        ));
        assert_eq!(
            parse_shortcut("a,b,x,lots").unwrap_err(),
            ConfigError::InvalidNumber { value: "lots".into() }
        );
        assert!(parse_shortcut("a,b,x,100").is_ok());
        assert!(parse_shortcut("a,b,x,12.5").is_ok());
    }

    #[test]
    fn test_invalid_duration() {
        assert_eq!(
            parse_shortcut("a,b,x,50,notaduration").unwrap_err(),
            ConfigError::InvalidDuration { value: "notaduration".into() }
        );
        assert!(matches!(
            parse_shortcut("a,b,x,50,0s").unwrap_err(),
            ConfigError::InvalidDuration { .. }
        ));
    }

    #[test]
    fn test_duration_literals() {
        assert_eq!(parse_duration("33s").unwrap(), Duration::from_secs(33));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("1500").unwrap(), Duration::from_millis(1500));
    }

    #[test]
    fn test_too_many_fields() {
        assert_eq!(
            parse_shortcut("a,b,x,50,2m,extra").unwrap_err(),
            ConfigError::TooManyFields { max: 5, got: 6 }
        );
    }

    #[test]
    fn test_empty_optional_fields_are_absent() {
        let policy = parse_shortcut("a,b,,,10s").unwrap();
        assert!(policy.matched_status_codes().is_empty());
        assert_eq!(policy.failure_rate_threshold(), None);
        assert_eq!(policy.wait_duration_open(), Some(Duration::from_secs(10)));
    }
}
