//! # Version Comparison
//!
//! Strict semantic-version parsing, compatibility constraints and ordering.
//!
//! Package versions are always parsed strictly: `1.2`, `v1.2.3` or `01.2.3` are
//! rejected. Constraint expressions are more forgiving and accept the usual
//! range syntax:
//!
//! - comparison operators: `=`, `!=`, `>`, `>=`, `<`, `<=`
//! - tilde and caret ranges: `~1.2.3`, `~>1.2`, `^7.x.x`, `^0.2.3`
//! - wildcards and partial versions: `7`, `7.x`, `7.2.*`, `*`
//! - hyphen ranges: `1.2 - 1.4.5`
//! - AND groups separated by whitespace or commas, OR groups separated by `||`
//!
//! ```rust
//! use package_registry::version::{parse_version, Constraint};
//!
//! let constraint = Constraint::parse("^7.x.x").unwrap();
//! assert!(constraint.matches(&parse_version("7.9.1").unwrap()));
//! assert!(!constraint.matches(&parse_version("6.5.2").unwrap()));
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::{BuildMetadata, Prerelease, Version};
use serde::{Serialize, Serializer};

/// Errors raised while parsing versions or constraint expressions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    #[error("invalid version '{input}': {reason}")]
    InvalidVersion { input: String, reason: String },

    #[error("invalid constraint '{input}': {reason}")]
    InvalidConstraint { input: String, reason: String },
}

/// Parse a strict semantic version.
pub fn parse_version(input: &str) -> Result<Version, VersionError> {
    Version::parse(input).map_err(|e| VersionError::InvalidVersion {
        input: input.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a version leniently: an optional `v` prefix and missing minor or
/// patch components are accepted (`v1.2` becomes `1.2.0`). Wildcards are not.
pub fn parse_loose(input: &str) -> Result<Version, VersionError> {
    let partial = Partial::parse(input).map_err(|reason| VersionError::InvalidVersion {
        input: input.to_string(),
        reason,
    })?;

    match partial.major {
        Some(major) if !partial.wildcard => Ok(Version {
            major,
            minor: partial.minor.unwrap_or(0),
            patch: partial.patch.unwrap_or(0),
            pre: partial.pre,
            build: partial.build,
        }),
        _ => Err(VersionError::InvalidVersion {
            input: input.to_string(),
            reason: "wildcards are not allowed in a version".to_string(),
        }),
    }
}

/// Returns true when `a` sorts after or equal to `b`.
///
/// Ordering follows semantic-version precedence; build metadata only breaks
/// ties, so two distinct version strings never compare equal.
pub fn newer_or_equal(a: &Version, b: &Version) -> bool {
    a >= b
}

/// Compare by semantic-version precedence, ignoring build metadata.
fn precedence(a: &Version, b: &Version) -> Ordering {
    (a.major, a.minor, a.patch, &a.pre).cmp(&(b.major, b.minor, b.patch, &b.pre))
}

/// A version with optional (wildcard) components, as written in constraints.
#[derive(Debug, Clone)]
struct Partial {
    major: Option<u64>,
    minor: Option<u64>,
    patch: Option<u64>,
    pre: Prerelease,
    build: BuildMetadata,
    wildcard: bool,
}

impl Partial {
    fn parse(input: &str) -> Result<Self, String> {
        let trimmed = input.trim();
        let trimmed = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err("empty version".to_string());
        }

        let (rest, build) = match trimmed.split_once('+') {
            Some((rest, build)) => (rest, Some(build)),
            None => (trimmed, None),
        };
        let (core, pre) = match rest.split_once('-') {
            Some((core, pre)) => (core, Some(pre)),
            None => (rest, None),
        };

        let parts: Vec<&str> = core.split('.').collect();
        if parts.len() > 3 {
            return Err(format!("too many components in '{core}'"));
        }

        let mut numbers = [None; 3];
        let mut seen_wildcard = false;
        for (slot, part) in numbers.iter_mut().zip(parts.iter()) {
            if matches!(*part, "x" | "X" | "*") {
                seen_wildcard = true;
                continue;
            }
            if seen_wildcard {
                return Err(format!("unexpected '{part}' after wildcard"));
            }
            if part.is_empty() || !part.chars().all(|c| c.is_ascii_digit()) {
                return Err(format!("'{part}' is not a number"));
            }
            *slot = Some(
                part.parse::<u64>()
                    .map_err(|e| format!("'{part}' is out of range: {e}"))?,
            );
        }

        let complete = numbers.iter().all(Option::is_some);
        let pre = match pre {
            Some(_) if !complete => {
                return Err("pre-release requires a full version".to_string());
            }
            Some(pre) => Prerelease::new(pre).map_err(|e| e.to_string())?,
            None => Prerelease::EMPTY,
        };
        let build = match build {
            Some(_) if !complete => {
                return Err("build metadata requires a full version".to_string());
            }
            Some(build) => BuildMetadata::new(build).map_err(|e| e.to_string())?,
            None => BuildMetadata::EMPTY,
        };

        Ok(Self {
            major: numbers[0],
            minor: numbers[1],
            patch: numbers[2],
            pre,
            build,
            wildcard: seen_wildcard,
        })
    }

    fn is_complete(&self) -> bool {
        self.major.is_some() && self.minor.is_some() && self.patch.is_some()
    }

    /// Lowest version covered by this partial version.
    fn floor(&self) -> Version {
        Version {
            major: self.major.unwrap_or(0),
            minor: self.minor.unwrap_or(0),
            patch: self.patch.unwrap_or(0),
            pre: self.pre.clone(),
            build: BuildMetadata::EMPTY,
        }
    }

    /// First version past the range covered by the wildcard components.
    /// Only meaningful when `major` is present and the version is incomplete.
    fn ceiling(&self) -> Result<Version, String> {
        let major = self.major.unwrap_or(0);
        match self.minor {
            None => Ok(Version::new(bump(major)?, 0, 0)),
            Some(minor) => Ok(Version::new(major, bump(minor)?, 0)),
        }
    }
}

fn bump(component: u64) -> Result<u64, String> {
    component
        .checked_add(1)
        .ok_or_else(|| "version component out of range".to_string())
}

/// A single primitive comparison after range expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Comparator {
    Any,
    Never,
    Exact(Version),
    NotEqual(Version),
    Greater(Version),
    GreaterEq(Version),
    Less(Version),
    LessEq(Version),
    /// Outside the half-open range `[low, high)`.
    Outside(Version, Version),
}

impl Comparator {
    fn matches(&self, version: &Version) -> bool {
        match self {
            Comparator::Any => true,
            Comparator::Never => false,
            Comparator::Exact(v) => precedence(version, v) == Ordering::Equal,
            Comparator::NotEqual(v) => precedence(version, v) != Ordering::Equal,
            Comparator::Greater(v) => precedence(version, v) == Ordering::Greater,
            Comparator::GreaterEq(v) => precedence(version, v) != Ordering::Less,
            Comparator::Less(v) => precedence(version, v) == Ordering::Less,
            Comparator::LessEq(v) => precedence(version, v) != Ordering::Greater,
            Comparator::Outside(low, high) => {
                precedence(version, low) == Ordering::Less
                    || precedence(version, high) != Ordering::Less
            }
        }
    }

    fn has_prerelease(&self) -> bool {
        match self {
            Comparator::Any | Comparator::Never => false,
            Comparator::Exact(v)
            | Comparator::NotEqual(v)
            | Comparator::Greater(v)
            | Comparator::GreaterEq(v)
            | Comparator::Less(v)
            | Comparator::LessEq(v) => !v.pre.is_empty(),
            Comparator::Outside(low, high) => !low.pre.is_empty() || !high.pre.is_empty(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    Tilde,
    Caret,
}

const OPERATORS: &[(&str, Op)] = &[
    (">=", Op::Ge),
    ("=>", Op::Ge),
    ("<=", Op::Le),
    ("=<", Op::Le),
    ("!=", Op::Ne),
    ("~>", Op::Tilde),
    (">", Op::Gt),
    ("<", Op::Lt),
    ("=", Op::Eq),
    ("~", Op::Tilde),
    ("^", Op::Caret),
];

fn split_operator(token: &str) -> (Op, &str) {
    for (symbol, op) in OPERATORS {
        if let Some(rest) = token.strip_prefix(symbol) {
            return (*op, rest);
        }
    }
    (Op::Eq, token)
}

fn is_bare_operator(token: &str) -> bool {
    OPERATORS.iter().any(|(symbol, _)| *symbol == token)
}

/// Expand one `<op><partial>` term into primitive comparators.
fn expand(op: Op, partial: &Partial) -> Result<Vec<Comparator>, String> {
    if partial.major.is_none() {
        return Ok(match op {
            Op::Ne | Op::Gt | Op::Lt => vec![Comparator::Never],
            _ => vec![Comparator::Any],
        });
    }

    let complete = partial.is_complete();
    let floor = partial.floor();

    let comparators = match op {
        Op::Eq if complete => vec![Comparator::Exact(floor)],
        Op::Eq => vec![
            Comparator::GreaterEq(floor),
            Comparator::Less(partial.ceiling()?),
        ],
        Op::Ne if complete => vec![Comparator::NotEqual(floor)],
        Op::Ne => vec![Comparator::Outside(floor, partial.ceiling()?)],
        Op::Gt if complete => vec![Comparator::Greater(floor)],
        Op::Gt => vec![Comparator::GreaterEq(partial.ceiling()?)],
        Op::Ge => vec![Comparator::GreaterEq(floor)],
        Op::Lt => vec![Comparator::Less(floor)],
        Op::Le if complete => vec![Comparator::LessEq(floor)],
        Op::Le => vec![Comparator::Less(partial.ceiling()?)],
        Op::Tilde => {
            let major = floor.major;
            let upper = match partial.minor {
                Some(minor) => Version::new(major, bump(minor)?, 0),
                None => Version::new(bump(major)?, 0, 0),
            };
            vec![Comparator::GreaterEq(floor), Comparator::Less(upper)]
        }
        Op::Caret => {
            let upper = match (floor.major, partial.minor, partial.patch) {
                (0, None, _) => Version::new(1, 0, 0),
                (0, Some(0), None) => Version::new(0, 1, 0),
                (0, Some(0), Some(patch)) => Version::new(0, 0, bump(patch)?),
                (0, Some(minor), _) => Version::new(0, bump(minor)?, 0),
                (major, _, _) => Version::new(bump(major)?, 0, 0),
            };
            vec![Comparator::GreaterEq(floor), Comparator::Less(upper)]
        }
    };
    Ok(comparators)
}

/// A parsed compatibility constraint such as `^7.x.x` or `>=6.5.0 <8.0.0 || 9.x`.
#[derive(Debug, Clone)]
pub struct Constraint {
    source: String,
    groups: Vec<Vec<Comparator>>,
}

impl Constraint {
    /// Parse a constraint expression.
    pub fn parse(input: &str) -> Result<Self, VersionError> {
        let invalid = |reason: String| VersionError::InvalidConstraint {
            input: input.to_string(),
            reason,
        };

        if input.trim().is_empty() {
            return Err(invalid("empty constraint".to_string()));
        }

        let mut groups = Vec::new();
        for group in input.split("||") {
            let comparators = Self::parse_group(group).map_err(invalid)?;
            groups.push(comparators);
        }

        Ok(Self {
            source: input.trim().to_string(),
            groups,
        })
    }

    fn parse_group(group: &str) -> Result<Vec<Comparator>, String> {
        let normalized = group.replace(',', " ");
        let tokens: Vec<&str> = normalized.split_whitespace().collect();
        if tokens.is_empty() {
            return Err("empty range in constraint".to_string());
        }

        let mut comparators = Vec::new();
        let mut i = 0;
        while i < tokens.len() {
            // Hyphen range: "<low> - <high>"
            if tokens.get(i + 1) == Some(&"-") {
                let high = tokens
                    .get(i + 2)
                    .ok_or_else(|| format!("hyphen range '{}' has no upper bound", tokens[i]))?;
                let low = Partial::parse(tokens[i])?;
                let high = Partial::parse(high)?;
                comparators.extend(expand(Op::Ge, &low)?);
                comparators.extend(expand(Op::Le, &high)?);
                i += 3;
                continue;
            }

            let token = if is_bare_operator(tokens[i]) {
                let operand = tokens
                    .get(i + 1)
                    .ok_or_else(|| format!("operator '{}' has no version", tokens[i]))?;
                let joined = format!("{}{}", tokens[i], operand);
                i += 2;
                joined
            } else {
                i += 1;
                tokens[i - 1].to_string()
            };

            let (op, rest) = split_operator(&token);
            let partial = Partial::parse(rest)?;
            comparators.extend(expand(op, &partial)?);
        }

        Ok(comparators)
    }

    /// Returns true when `version` satisfies any of the OR groups.
    ///
    /// A pre-release version only satisfies a group that mentions a
    /// pre-release itself, so `^7.x.x` does not match `7.1.0-beta1`.
    pub fn matches(&self, version: &Version) -> bool {
        self.groups.iter().any(|group| {
            if !version.pre.is_empty() && !group.iter().any(Comparator::has_prerelease) {
                return false;
            }
            group.iter().all(|comparator| comparator.matches(version))
        })
    }

    /// The expression as written in the manifest.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for Constraint {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Constraint {}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

impl FromStr for Constraint {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Constraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        parse_version(s).unwrap()
    }

    fn satisfies(constraint: &str, version: &str) -> bool {
        Constraint::parse(constraint).unwrap().matches(&v(version))
    }

    #[test]
    fn test_parse_version_is_strict() {
        assert!(parse_version("1.0.0").is_ok());
        assert!(parse_version("1.0.0-beta.1+build.5").is_ok());

        for bad in ["1.0", "v1.0.0", "01.0.0", "a.b.c", "", "1.0.0-", "1.0.0.0"] {
            assert!(
                matches!(parse_version(bad), Err(VersionError::InvalidVersion { .. })),
                "expected '{bad}' to be rejected"
            );
        }
    }

    #[test]
    fn test_parse_loose() {
        assert_eq!(parse_loose("v1.2").unwrap(), Version::new(1, 2, 0));
        assert_eq!(parse_loose("7").unwrap(), Version::new(7, 0, 0));
        assert_eq!(parse_loose("1.2.3").unwrap(), Version::new(1, 2, 3));
        assert!(parse_loose("example").is_err());
        assert!(parse_loose("1.x").is_err());
    }

    #[test]
    fn test_newer_or_equal_is_reflexive_and_antisymmetric() {
        let versions = [
            "0.0.1",
            "0.1.0",
            "1.0.0-alpha",
            "1.0.0-alpha.1",
            "1.0.0-beta",
            "1.0.0",
            "1.0.0+build.1",
            "1.0.0+build.2",
            "1.10.0",
            "2.0.0",
        ];

        for a in versions {
            assert!(newer_or_equal(&v(a), &v(a)), "{a} >= {a}");
            for b in versions {
                if a != b {
                    assert_ne!(
                        newer_or_equal(&v(a), &v(b)),
                        newer_or_equal(&v(b), &v(a)),
                        "{a} vs {b}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_newer_or_equal_prerelease_precedence() {
        assert!(newer_or_equal(&v("1.0.0"), &v("1.0.0-rc.1")));
        assert!(newer_or_equal(&v("1.0.0-beta.11"), &v("1.0.0-beta.2")));
        assert!(!newer_or_equal(&v("1.9.0"), &v("1.10.0")));
    }

    #[test]
    fn test_caret_with_wildcards() {
        assert!(satisfies("^7.x.x", "7.0.0"));
        assert!(satisfies("^7.x.x", "7.2.1"));
        assert!(!satisfies("^7.x.x", "6.5.2"));
        assert!(!satisfies("^7.x.x", "8.0.0"));
    }

    #[test]
    fn test_caret_zero_major() {
        assert!(satisfies("^0.2.3", "0.2.9"));
        assert!(!satisfies("^0.2.3", "0.3.0"));
        assert!(satisfies("^0.0.3", "0.0.3"));
        assert!(!satisfies("^0.0.3", "0.0.4"));
    }

    #[test]
    fn test_tilde() {
        assert!(satisfies("~1.2.3", "1.2.9"));
        assert!(!satisfies("~1.2.3", "1.3.0"));
        assert!(satisfies("~1", "1.9.0"));
        assert!(!satisfies("~1", "2.0.0"));
    }

    #[test]
    fn test_comparison_operators() {
        assert!(satisfies(">=6.5.0 <8.0.0", "7.4.0"));
        assert!(!satisfies(">=6.5.0 <8.0.0", "8.0.0"));
        assert!(satisfies(">= 6.5.0, < 8.0.0", "6.5.0"));
        assert!(satisfies(">1.2", "1.3.0"));
        assert!(!satisfies(">1.2", "1.2.9"));
        assert!(satisfies("<=1.2.x", "1.2.9"));
        assert!(!satisfies("<=1.2.x", "1.3.0"));
        assert!(satisfies("!=1.2.3", "1.2.4"));
        assert!(!satisfies("!=1.2.x", "1.2.4"));
        assert!(satisfies("=1.2.3", "1.2.3+meta"));
    }

    #[test]
    fn test_or_groups_and_hyphen_ranges() {
        assert!(satisfies("6.x || >=7.5.0", "6.8.0"));
        assert!(satisfies("6.x || >=7.5.0", "7.6.0"));
        assert!(!satisfies("6.x || >=7.5.0", "7.0.0"));
        assert!(satisfies("1.2 - 1.4.5", "1.4.5"));
        assert!(!satisfies("1.2 - 1.4.5", "1.4.6"));
        assert!(satisfies("1.2.3 - 2.3", "2.3.9"));
        assert!(satisfies("*", "42.0.0"));
    }

    #[test]
    fn test_prerelease_requires_prerelease_constraint() {
        assert!(!satisfies("^7.x.x", "7.1.0-beta1"));
        assert!(satisfies(">=7.1.0-alpha", "7.1.0-beta1"));
    }

    #[test]
    fn test_invalid_constraints() {
        for bad in ["", "   ", "^a.b", ">=", "1.2 -", "1.x.3", "1.0.0 ||", "1.2.3.4"] {
            assert!(
                matches!(
                    Constraint::parse(bad),
                    Err(VersionError::InvalidConstraint { .. })
                ),
                "expected '{bad}' to be rejected"
            );
        }
    }

    #[test]
    fn test_constraint_bounds_past_u64_are_rejected() {
        for bad in [
            "^18446744073709551615.0.0",
            "~1.18446744073709551615",
            "18446744073709551615.x",
            "^0.0.18446744073709551615",
            "<=1.18446744073709551615",
        ] {
            let err = Constraint::parse(bad).unwrap_err();
            assert!(
                err.to_string().contains("version component out of range"),
                "unexpected error for '{bad}': {err}"
            );
        }
        assert!(Constraint::parse(">=18446744073709551615.0.0").is_ok());
    }

    #[test]
    fn test_constraint_serializes_as_source() {
        let constraint = Constraint::parse("^7.x.x").unwrap();
        assert_eq!(serde_json::to_string(&constraint).unwrap(), "\"^7.x.x\"");
        assert_eq!(constraint.to_string(), "^7.x.x");
    }
}
