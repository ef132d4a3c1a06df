//! Module versions and version ranges
//!
//! Only parsing, display and equality live here. Range matching belongs to
//! the resolver.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::module::traits::ModuleError;

/// `major.minor.micro[.qualifier]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub micro: u32,
    pub qualifier: String,
}

impl Version {
    pub fn new(major: u32, minor: u32, micro: u32) -> Self {
        Self {
            major,
            minor,
            micro,
            qualifier: String::new(),
        }
    }

    pub fn with_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.qualifier = qualifier.into();
        self
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.micro)?;
        if !self.qualifier.is_empty() {
            write!(f, ".{}", self.qualifier)?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Version::default());
        }

        let mut parts = s.splitn(4, '.');
        let mut numeric = [0u32; 3];
        for slot in numeric.iter_mut() {
            match parts.next() {
                Some(part) => {
                    *slot = part.parse().map_err(|_| {
                        ModuleError::InvalidArgument(format!(
                            "Invalid version component '{}' in '{}'",
                            part, s
                        ))
                    })?;
                }
                None => break,
            }
        }
        let qualifier = parts.next().unwrap_or_default().to_string();

        Ok(Version {
            major: numeric[0],
            minor: numeric[1],
            micro: numeric[2],
            qualifier,
        })
    }
}

impl TryFrom<String> for Version {
    type Error = ModuleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

/// Interval of versions, `[min,max)` style; a bare version means "at least"
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    pub min: Version,
    pub include_min: bool,
    pub max: Option<Version>,
    pub include_max: bool,
}

impl VersionRange {
    /// `[min, infinity)`
    pub fn at_least(min: Version) -> Self {
        Self {
            min,
            include_min: true,
            max: None,
            include_max: false,
        }
    }

    /// `[min, max)`
    pub fn half_open(min: Version, max: Version) -> Self {
        Self {
            min,
            include_min: true,
            max: Some(max),
            include_max: false,
        }
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::at_least(Version::default())
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.max {
            None if self.include_min => write!(f, "{}", self.min),
            None => write!(f, "({},)", self.min),
            Some(max) => write!(
                f,
                "{}{},{}{}",
                if self.include_min { '[' } else { '(' },
                self.min,
                max,
                if self.include_max { ']' } else { ')' }
            ),
        }
    }
}

impl FromStr for VersionRange {
    type Err = ModuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some(first) = s.chars().next() else {
            return Ok(VersionRange::default());
        };
        if first != '[' && first != '(' {
            return Ok(VersionRange::at_least(s.parse()?));
        }

        let last = s.chars().last().unwrap_or(first);
        if s.len() < 2 || (last != ']' && last != ')') {
            return Err(ModuleError::InvalidArgument(format!("Unterminated version range '{}'", s)));
        }
        let body = &s[1..s.len() - 1];
        let (min, max) = body
            .split_once(',')
            .ok_or_else(|| {
                ModuleError::InvalidArgument(format!("Version range '{}' needs a comma", s))
            })?;
        let max = max.trim();

        Ok(VersionRange {
            min: min.parse()?,
            include_min: first == '[',
            max: if max.is_empty() { None } else { Some(max.parse()?) },
            include_max: last == ']',
        })
    }
}

impl TryFrom<String> for VersionRange {
    type Error = ModuleError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<VersionRange> for String {
    fn from(range: VersionRange) -> Self {
        range.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        let v: Version = "1.2.3.beta".parse().unwrap();
        assert_eq!(v, Version::new(1, 2, 3).with_qualifier("beta"));
        assert_eq!("2".parse::<Version>().unwrap(), Version::new(2, 0, 0));
        assert_eq!("".parse::<Version>().unwrap(), Version::default());
        assert!("1.x".parse::<Version>().is_err());
    }

    #[test]
    fn test_parse_range() {
        let r: VersionRange = "[1.0,2.0)".parse().unwrap();
        assert_eq!(r, VersionRange::half_open(Version::new(1, 0, 0), Version::new(2, 0, 0)));
        assert_eq!(r.to_string(), "[1.0.0,2.0.0)");

        let r: VersionRange = "1.5".parse().unwrap();
        assert_eq!(r, VersionRange::at_least(Version::new(1, 5, 0)));

        assert!("[1.0".parse::<VersionRange>().is_err());
        assert!("[1.0]".parse::<VersionRange>().is_err());
    }
}
