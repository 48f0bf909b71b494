//! Environment lookup helpers shared by the config sections.

use std::str::FromStr;

use crate::error::ConfigError;

/// Read an environment variable, treating "unset" and "empty" alike.
pub(crate) fn optional_env(key: &str) -> Result<Option<String>, ConfigError> {
    match std::env::var(key) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(std::env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "not valid unicode".to_string(),
        }),
    }
}

/// Parse an environment variable, falling back to `default` when unset.
pub(crate) fn parse_optional_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    optional_env(key)?
        .map(|s| s.trim().parse::<T>())
        .transpose()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
        .map(|v| v.unwrap_or(default))
}

/// Parse a boolean environment variable ("true"/"false", "1"/"0").
pub(crate) fn parse_bool_env(key: &str, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = optional_env(key)? else {
        return Ok(default);
    };
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("must be 'true' or 'false', got '{}'", other),
        }),
    }
}

/// Serializes tests that touch process-wide environment variables.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_optional_env() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: ENV_LOCK serializes env mutation across this crate's tests.
        unsafe {
            std::env::set_var("APPTESTER_HELPERS_NUM", " 42 ");
            std::env::set_var("APPTESTER_HELPERS_BAD", "abc");
            std::env::set_var("APPTESTER_HELPERS_EMPTY", "");
        }

        assert_eq!(parse_optional_env("APPTESTER_HELPERS_NUM", 7u64).unwrap(), 42);
        assert_eq!(parse_optional_env("APPTESTER_HELPERS_EMPTY", 7u64).unwrap(), 7);
        assert_eq!(parse_optional_env("APPTESTER_HELPERS_UNSET", 7u64).unwrap(), 7);

        let err = parse_optional_env("APPTESTER_HELPERS_BAD", 7u64).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "APPTESTER_HELPERS_BAD"));

        unsafe {
            std::env::remove_var("APPTESTER_HELPERS_NUM");
            std::env::remove_var("APPTESTER_HELPERS_BAD");
            std::env::remove_var("APPTESTER_HELPERS_EMPTY");
        }
    }

    #[test]
    fn test_parse_bool_env() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        unsafe {
            std::env::set_var("APPTESTER_HELPERS_FLAG", "Yes");
            std::env::set_var("APPTESTER_HELPERS_NOFLAG", "0");
            std::env::set_var("APPTESTER_HELPERS_BADFLAG", "maybe");
        }

        assert!(parse_bool_env("APPTESTER_HELPERS_FLAG", false).unwrap());
        assert!(!parse_bool_env("APPTESTER_HELPERS_NOFLAG", true).unwrap());
        assert!(parse_bool_env("APPTESTER_HELPERS_UNSET_FLAG", true).unwrap());
        assert!(parse_bool_env("APPTESTER_HELPERS_BADFLAG", true).is_err());

        unsafe {
            std::env::remove_var("APPTESTER_HELPERS_FLAG");
            std::env::remove_var("APPTESTER_HELPERS_NOFLAG");
            std::env::remove_var("APPTESTER_HELPERS_BADFLAG");
        }
    }
}
