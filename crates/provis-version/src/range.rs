//! Version range type

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::VersionError;
use crate::version::Version;

/// An interval of versions.
///
/// Ranges are written in interval notation: `[1.0,2.0)` includes 1.0 and
/// excludes 2.0. A bare version such as `1.0` means "1.0 or later" with no
/// upper bound, and both the empty string and `0.0.0` match every version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionRange {
    min: Version,
    include_min: bool,
    /// None is positive infinity
    max: Option<Version>,
    include_max: bool,
}

impl VersionRange {
    /// Create a range from explicit bounds
    pub fn new(min: Version, include_min: bool, max: Option<Version>, include_max: bool) -> Self {
        Self {
            min,
            include_min,
            max,
            include_max,
        }
    }

    /// The range matching every version
    pub fn any() -> Self {
        Self::at_least(Version::zero())
    }

    /// `min` or later, with no upper bound
    pub fn at_least(min: Version) -> Self {
        Self::new(min, true, None, false)
    }

    /// Exactly one version, `[v,v]`
    pub fn exact(version: Version) -> Self {
        Self::new(version.clone(), true, Some(version), true)
    }

    /// Parse a range string.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(Self::any());
        }

        let invalid = |reason: &str| VersionError::InvalidRange {
            range: input.to_string(),
            reason: reason.to_string(),
        };

        let first = trimmed.chars().next().unwrap_or(' ');
        if first != '[' && first != '(' {
            let min = Version::parse(trimmed).map_err(|_| invalid("invalid version"))?;
            return Ok(Self::at_least(min));
        }

        let last = trimmed.chars().last().unwrap_or(' ');
        if last != ']' && last != ')' {
            return Err(invalid("missing closing bracket"));
        }

        let body = &trimmed[1..trimmed.len() - 1];
        let (low, high) = body
            .split_once(',')
            .ok_or_else(|| invalid("expected a comma between bounds"))?;

        let min = Version::parse(low).map_err(|_| invalid("invalid lower bound"))?;
        let max = Version::parse(high).map_err(|_| invalid("invalid upper bound"))?;

        let include_min = first == '[';
        let include_max = last == ']';

        if max < min || (max == min && !(include_min && include_max)) {
            return Err(invalid("upper bound is below lower bound"));
        }

        Ok(Self::new(min, include_min, Some(max), include_max))
    }

    /// Check whether a version lies inside this range
    pub fn includes(&self, version: &Version) -> bool {
        let above_min = if self.include_min {
            version >= &self.min
        } else {
            version > &self.min
        };
        if !above_min {
            return false;
        }

        match &self.max {
            None => true,
            Some(max) if self.include_max => version <= max,
            Some(max) => version < max,
        }
    }

    /// Whether this range accepts every version
    pub fn is_any(&self) -> bool {
        self.include_min && self.min == Version::zero() && self.max.is_none()
    }

    pub fn min(&self) -> &Version {
        &self.min
    }

    pub fn max(&self) -> Option<&Version> {
        self.max.as_ref()
    }

    pub fn includes_min(&self) -> bool {
        self.include_min
    }

    pub fn includes_max(&self) -> bool {
        self.include_max
    }
}

impl Default for VersionRange {
    fn default() -> Self {
        Self::any()
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
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionRange {
    type Error = VersionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionRange> for String {
    fn from(range: VersionRange) -> Self {
        range.to_string()
    }
}
