//! Relative path validation
//!
//! Every client-supplied path passes through [`PathValidator::validate`]
//! before any handle is touched. Accepted paths come back as a
//! [`ValidatedPath`] holding the cleaned segment list.

use crate::config::DEFAULT_SENSITIVE_NAMES;
use crate::error::ValidationError;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::trace;

static DRIVE_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z]:").expect("static regex"));

/// A path that passed validation, relative to the active root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPath {
    segments: Vec<String>,
}

impl ValidatedPath {
    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    /// True for `""`, `.` and `./`
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Last segment, if the path is not the root
    pub fn file_name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Segments joined with `/`; empty for the root
    pub fn as_relative(&self) -> String {
        self.segments.join("/")
    }

    /// Join a child entry name onto this path
    pub fn child(&self, name: &str) -> String {
        if self.is_root() {
            name.to_string()
        } else {
            format!("{}/{}", self.as_relative(), name)
        }
    }
}

/// Validates client paths against traversal, absolute and sensitive-name rules
#[derive(Debug, Clone)]
pub struct PathValidator {
    sensitive_names: Vec<String>,
}

impl Default for PathValidator {
    fn default() -> Self {
        Self::new(DEFAULT_SENSITIVE_NAMES.iter().map(|s| s.to_string()))
    }
}

impl PathValidator {
    pub fn new(sensitive_names: impl IntoIterator<Item = String>) -> Self {
        Self {
            sensitive_names: sensitive_names
                .into_iter()
                .map(|n| n.to_lowercase())
                .filter(|n| !n.is_empty())
                .collect(),
        }
    }

    /// Validate `path`. The rules do not depend on `grant_active`; absolute
    /// paths are rejected even when no grant exists.
    pub fn validate(&self, path: &str, grant_active: bool) -> Result<ValidatedPath, ValidationError> {
        trace!(path, grant_active, "Validating path");

        if matches!(path, "" | "." | "./") {
            return Ok(ValidatedPath::root());
        }

        let normalized = path.replace('\\', "/");

        if normalized.split('/').any(|segment| segment == "..") {
            return Err(ValidationError::Traversal(path.to_string()));
        }

        if normalized.starts_with('/') || DRIVE_PREFIX.is_match(&normalized) {
            return Err(ValidationError::Absolute(path.to_string()));
        }

        // Substring match on purpose: "etc" also blocks "sketches".
        let lowered = normalized.to_lowercase();
        if let Some(name) = self
            .sensitive_names
            .iter()
            .find(|name| lowered.contains(name.as_str()))
        {
            return Err(ValidationError::Sensitive(format!("{} ({})", path, name)));
        }

        let segments = normalized
            .split('/')
            .filter(|s| !s.is_empty() && *s != ".")
            .map(str::to_string)
            .collect();

        Ok(ValidatedPath { segments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> PathValidator {
        PathValidator::default()
    }

    #[test]
    fn test_root_aliases() {
        for path in ["", ".", "./"] {
            for active in [true, false] {
                let validated = validator().validate(path, active).unwrap();
                assert!(validated.is_root(), "{path:?} should denote the root");
            }
        }
    }

    #[test]
    fn test_traversal_rejected_in_both_grant_states() {
        for path in ["..", "../notes", "notes/../../x", "a/..", "notes\\..\\x"] {
            for active in [true, false] {
                assert!(
                    matches!(validator().validate(path, active), Err(ValidationError::Traversal(_))),
                    "{path:?} should be traversal"
                );
            }
        }
    }

    #[test]
    fn test_dotted_names_are_not_traversal() {
        let validated = validator().validate("notes/..hidden/a..b.txt", true).unwrap();
        assert_eq!(validated.segments(), ["notes", "..hidden", "a..b.txt"]);
    }

    #[test]
    fn test_absolute_rejected_regardless_of_grant() {
        for path in ["/notes/a.txt", "C:/Users/a.txt", "c:\\docs", "\\share\\a.txt", "D:"] {
            for active in [true, false] {
                assert!(
                    matches!(validator().validate(path, active), Err(ValidationError::Absolute(_))),
                    "{path:?} should be absolute"
                );
            }
        }
    }

    #[test]
    fn test_sensitive_names_are_case_insensitive_substrings() {
        for path in ["Windows/notepad.exe", "Program Files/app", "config/etc", "sketches", "my_VAR"] {
            assert!(
                matches!(validator().validate(path, true), Err(ValidationError::Sensitive(_))),
                "{path:?} should be sensitive"
            );
        }
    }

    #[test]
    fn test_backslashes_and_empty_segments_are_normalized() {
        let validated = validator().validate("notes\\\\drafts//a.txt", true).unwrap();
        assert_eq!(validated.as_relative(), "notes/drafts/a.txt");
        assert_eq!(validated.file_name(), Some("a.txt"));
    }

    #[test]
    fn test_leading_dot_segment_is_dropped() {
        let validated = validator().validate("./notes/a.txt", false).unwrap();
        assert_eq!(validated.as_relative(), "notes/a.txt");
        assert_eq!(validated.child("b.txt"), "notes/a.txt/b.txt");
        assert_eq!(ValidatedPath::root().child("b.txt"), "b.txt");
    }

    #[test]
    fn test_custom_sensitive_list() {
        let validator = PathValidator::new(vec!["Secrets".to_string()]);
        assert!(validator.validate("var/log", true).is_ok());
        assert!(matches!(
            validator.validate("my-secrets/key", true),
            Err(ValidationError::Sensitive(_))
        ));
    }
}
