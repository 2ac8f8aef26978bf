//! Module version triple.

use std::fmt;
use std::str::FromStr;

use crate::error::{RuntimeError, RuntimeResult};

/// A `major.minor.patch` version carried by modules and profiles.
///
/// Two forms exist: a *defined* version parsed from a dotted-numeric string,
/// and the *none* version used as a wildcard in lookups. `none` compares equal
/// to `none` and lower than any defined version; defined versions order
/// lexicographically on `(major, minor, patch)`.
///
/// Parsing tolerates missing components: `"1"` and `"1.0"` both parse as
/// `1.0.0`.
/// The default is the `none` wildcard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(Option<(u32, u32, u32)>);

impl Version {
    /// Creates a defined version from its three components.
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Version(Some((major, minor, patch)))
    }

    /// Returns the wildcard version that matches nothing in particular.
    pub fn none() -> Self {
        Version(None)
    }

    /// Returns `true` when this is a defined (parsed) version.
    pub fn is_defined(&self) -> bool {
        self.0.is_some()
    }

    /// The `(major, minor, patch)` triple, or `None` for the wildcard.
    pub fn parts(&self) -> Option<(u32, u32, u32)> {
        self.0
    }
}

impl FromStr for Version {
    type Err = RuntimeError;

    fn from_str(s: &str) -> RuntimeResult<Self> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Version::none());
        }
        let mut parts = [0u32; 3];
        for (i, component) in trimmed.splitn(3, '.').enumerate() {
            parts[i] = component.parse().map_err(|_| RuntimeError::MissingInformation {
                detail: format!("'{s}' is not a well-formed version string"),
            })?;
        }
        Ok(Version::new(parts[0], parts[1], parts[2]))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some((major, minor, patch)) => write!(f, "{major}.{minor}.{patch}"),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_triple() {
        let v: Version = "1.2.3".parse().unwrap();
        assert_eq!(v, Version::new(1, 2, 3));
    }

    #[test]
    fn missing_components_are_zero() {
        assert_eq!("2".parse::<Version>().unwrap(), Version::new(2, 0, 0));
        assert_eq!("2.1".parse::<Version>().unwrap(), Version::new(2, 1, 0));
    }

    #[test]
    fn empty_string_is_none() {
        let v: Version = "".parse().unwrap();
        assert!(!v.is_defined());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!("1.x.3".parse::<Version>().is_err());
    }

    #[test]
    fn none_sorts_below_any_defined_version() {
        assert!(Version::none() < Version::new(0, 0, 0));
        assert_eq!(Version::none(), Version::none());
    }

    #[test]
    fn ordering_is_lexicographic() {
        assert!(Version::new(1, 9, 9) < Version::new(2, 0, 0));
        assert!(Version::new(1, 2, 3) < Version::new(1, 3, 0));
        assert!(Version::new(1, 2, 3) < Version::new(1, 2, 4));
    }

    #[test]
    fn format_parse_round_trip() {
        for v in [Version::new(0, 0, 1), Version::new(12, 4, 0), Version::new(3, 0, 0)] {
            assert_eq!(v.to_string().parse::<Version>().unwrap(), v);
        }
    }
}
