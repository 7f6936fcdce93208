//! Typed parsing of shell-style environment variable specifications.
//!
//! Recognizes the forms `NAME`, `NAME=value`, `NAME=${VAR}`,
//! `NAME=${VAR:-default}`, and `NAME=${VAR:-}` (an empty default means the
//! variable is required), emitting a single discriminated record per entry
//! rather than a union of ad-hoc shapes.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVarSpec {
    pub name: String,
    pub has_default: bool,
    pub default: Option<String>,
    pub is_required: bool,
}

#[must_use]
pub fn parse(entry: &str) -> EnvVarSpec {
    let Some((name, rest)) = entry.split_once('=') else {
        return EnvVarSpec {
            name: entry.to_string(),
            has_default: false,
            default: None,
            is_required: true,
        };
    };

    if let Some(inner) = rest.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        let var_name = inner.split(":-").next().unwrap_or(inner).to_string();
        if let Some((_, default)) = inner.split_once(":-") {
            if default.is_empty() {
                return EnvVarSpec {
                    name: name.to_string(),
                    has_default: false,
                    default: None,
                    is_required: true,
                };
            }
            return EnvVarSpec {
                name: name.to_string(),
                has_default: true,
                default: Some(default.to_string()),
                is_required: false,
            };
        }
        // `${VAR}` with no default: the value is interpolated from VAR at
        // resolve time, but the spec itself carries no literal default.
        let _ = var_name;
        return EnvVarSpec {
            name: name.to_string(),
            has_default: false,
            default: None,
            is_required: true,
        };
    }

    EnvVarSpec {
        name: name.to_string(),
        has_default: true,
        default: Some(rest.to_string()),
        is_required: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_name_is_required() {
        let spec = parse("FOO");
        assert_eq!(spec.name, "FOO");
        assert!(spec.is_required);
        assert!(!spec.has_default);
    }

    #[test]
    fn literal_default() {
        let spec = parse("FOO=bar");
        assert_eq!(spec.default.as_deref(), Some("bar"));
        assert!(!spec.is_required);
    }

    #[test]
    fn interpolated_with_default() {
        let spec = parse("FOO=${BAR:-baz}");
        assert_eq!(spec.name, "FOO");
        assert_eq!(spec.default.as_deref(), Some("baz"));
        assert!(!spec.is_required);
    }

    #[test]
    fn interpolated_empty_default_is_required() {
        let spec = parse("FOO=${BAR:-}");
        assert!(spec.is_required);
        assert!(!spec.has_default);
    }

    #[test]
    fn interpolated_no_default_is_required() {
        let spec = parse("FOO=${BAR}");
        assert!(spec.is_required);
    }
}
