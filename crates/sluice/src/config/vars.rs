//! Environment variable interpolation for config files.
//!
//! Supported forms:
//! - `$VAR` or `${VAR}`: value of VAR, error if unset
//! - `${VAR:-default}`: default if VAR is unset or empty
//! - `${VAR-default}`: default only if VAR is unset
//! - `$$`: a literal `$`

use std::env;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::error::ConfigError;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$
        | \$\{ (?P<braced>[A-Za-z_][A-Za-z0-9_]*) (?: (?P<op>:?-) (?P<default>[^}]*) )? \}
        | \$ (?P<bare>[A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("placeholder pattern is valid")
});

/// Interpolate against the process environment.
pub fn interpolate(input: &str) -> Result<String, ConfigError> {
    interpolate_with(input, |name| env::var(name).ok())
}

/// Interpolate using `lookup` to resolve variable names.
///
/// Every unresolvable variable is reported, not just the first.
pub fn interpolate_with<F>(input: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut problems = Vec::new();

    let text = PLACEHOLDER.replace_all(input, |caps: &Captures| {
        let Some(name) = caps.name("braced").or_else(|| caps.name("bare")) else {
            return "$".to_string();
        };
        let name = name.as_str();
        let op = caps.name("op").map(|m| m.as_str());
        let default = caps.name("default").map(|m| m.as_str());

        match (lookup(name), op) {
            (Some(value), _) if value.contains(['\n', '\r']) => {
                problems.push(format!("environment variable '{name}' contains a newline"));
                String::new()
            }
            (Some(value), Some(":-")) if value.is_empty() => default.unwrap_or_default().to_string(),
            (Some(value), _) => value,
            (None, Some(_)) => default.unwrap_or_default().to_string(),
            (None, None) => {
                problems.push(format!("environment variable '{name}' is not set"));
                String::new()
            }
        }
    });

    ensure_resolved(problems)?;
    Ok(text.into_owned())
}

fn ensure_resolved(problems: Vec<String>) -> Result<(), ConfigError> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::EnvInterpolation {
            message: problems.join("\n"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_braced_and_bare() {
        let lookup = vars(&[("HOST", "example.com"), ("PORT", "8080")]);
        let out = interpolate_with("http://${HOST}:$PORT/", lookup).unwrap();
        assert_eq!(out, "http://example.com:8080/");
    }

    #[test]
    fn test_missing_variables_all_reported() {
        let err = interpolate_with("$A and ${B}", vars(&[])).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("'A' is not set"));
        assert!(message.contains("'B' is not set"));
    }

    #[test]
    fn test_colon_dash_default_covers_empty() {
        let lookup = vars(&[("EMPTY", "")]);
        assert_eq!(interpolate_with("${EMPTY:-fallback}", &lookup).unwrap(), "fallback");
        assert_eq!(interpolate_with("${UNSET:-fallback}", &lookup).unwrap(), "fallback");
    }

    #[test]
    fn test_dash_default_keeps_empty() {
        let lookup = vars(&[("EMPTY", "")]);
        assert_eq!(interpolate_with("[${EMPTY-fallback}]", &lookup).unwrap(), "[]");
        assert_eq!(interpolate_with("[${UNSET-fallback}]", &lookup).unwrap(), "[fallback]");
    }

    #[test]
    fn test_escape_sequence() {
        assert_eq!(interpolate_with("price: $$100", vars(&[])).unwrap(), "price: $100");
    }

    #[test]
    fn test_newline_rejected() {
        let err = interpolate_with("${BAD}", vars(&[("BAD", "a\nb")])).unwrap_err();
        assert!(err.to_string().contains("newline"));
    }
}
