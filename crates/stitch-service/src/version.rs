//! Core version requirements declared by plugins.

use semver::{Comparator, Op, Version, VersionReq};
use serde_json::Value;

use crate::error::{Result, ServiceError};

/// A version requirement as plugins declare it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    /// A bare major version, read as `^N.0.0-0`.
    Major(u64),
    /// A semver range such as `^5.1`, `>=4 <6` or `4.x || 5.x`.
    Range(String),
}

impl VersionSpec {
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(VersionSpec::Major).ok_or_else(|| {
                ServiceError::invalid(
                    "version",
                    format!("{n} is not a major version number"),
                    "Pass a whole major version such as 5, or a semver range string",
                )
            }),
            Value::String(s) => Ok(VersionSpec::Range(s.clone())),
            other => Err(ServiceError::invalid(
                "version",
                format!("expected a number or a semver range string, got {other}"),
                "Pass a whole major version such as 5, or a semver range string",
            )),
        }
    }

    pub fn display_range(&self) -> String {
        match self {
            VersionSpec::Major(major) => format!("^{major}.0.0-0"),
            VersionSpec::Range(range) => range.clone(),
        }
    }

    /// Alternatives of the requirement; any one of them must match.
    pub fn requirements(&self) -> Result<Vec<VersionReq>> {
        let range = self.display_range();
        range
            .split("||")
            .map(|alternative| parse_requirement(alternative.trim()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| {
                ServiceError::invalid(
                    "version",
                    format!("'{range}' is not a valid semver range"),
                    "Use a range such as ^5.0.0 or >=4.2, <6",
                )
            })
    }

    /// Whether `version` satisfies this requirement, counting pre-releases.
    pub fn matches(&self, version: &Version) -> Result<bool> {
        Ok(self
            .requirements()?
            .iter()
            .any(|req| satisfies_including_prerelease(version, req)))
    }
}

impl From<u64> for VersionSpec {
    fn from(major: u64) -> Self {
        VersionSpec::Major(major)
    }
}

impl From<&str> for VersionSpec {
    fn from(range: &str) -> Self {
        VersionSpec::Range(range.to_string())
    }
}

/// Accept both comma separated and whitespace separated comparators.
fn parse_requirement(input: &str) -> Option<VersionReq> {
    if input.is_empty() {
        return Some(VersionReq::STAR);
    }
    if let Ok(req) = VersionReq::parse(input) {
        return Some(req);
    }

    // a bare operator token belongs to the version that follows it
    let is_operator = |s: &str| s.chars().all(|c| matches!(c, '<' | '>' | '=' | '^' | '~'));
    let mut comparators: Vec<String> = Vec::new();
    for token in input.split([' ', ',']).filter(|t| !t.is_empty()) {
        match comparators.last_mut() {
            Some(last) if is_operator(last) => last.push_str(token),
            _ => comparators.push(token.to_string()),
        }
    }
    VersionReq::parse(&comparators.join(", ")).ok()
}

/// Unlike [`VersionReq::matches`], pre-release versions are compared like
/// any other version instead of only matching comparators on the same
/// `major.minor.patch`.
pub fn satisfies_including_prerelease(version: &Version, req: &VersionReq) -> bool {
    if version.pre.is_empty() {
        return req.matches(version);
    }
    // `>= version` always holds for `version` itself and makes its
    // pre-release tag acceptable to the matcher.
    let mut req = req.clone();
    req.comparators.push(Comparator {
        op: Op::GreaterEq,
        major: version.major,
        minor: Some(version.minor),
        patch: Some(version.patch),
        pre: version.pre.clone(),
    });
    req.matches(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn major_number_is_a_caret_floor() {
        let spec = VersionSpec::from_value(&json!(5)).unwrap();
        assert!(spec.matches(&v("5.2.0")).unwrap());
        assert!(!spec.matches(&v("4.9.9")).unwrap());
        assert!(!spec.matches(&v("6.0.0")).unwrap());
        assert!(spec.matches(&v("5.0.0-beta.1")).unwrap());
    }

    #[test]
    fn prereleases_participate() {
        let spec = VersionSpec::from("^5.0.0");
        assert!(spec.matches(&v("5.3.0-rc.1")).unwrap());
        assert!(!spec.matches(&v("5.0.0-rc.1")).unwrap());
    }

    #[test]
    fn whitespace_and_alternatives() {
        let spec = VersionSpec::from(">= 4.2 <6");
        assert!(spec.matches(&v("5.0.0")).unwrap());
        assert!(!spec.matches(&v("4.1.0")).unwrap());

        let spec = VersionSpec::from("3.x || ^5");
        assert!(spec.matches(&v("3.4.0")).unwrap());
        assert!(!spec.matches(&v("4.0.0")).unwrap());
        assert!(spec.matches(&v("5.9.1")).unwrap());
    }

    #[test]
    fn other_shapes_are_invalid() {
        for value in [json!(true), json!(null), json!({ "min": 5 }), json!(5.5)] {
            let err = VersionSpec::from_value(&value).unwrap_err();
            assert!(matches!(err, ServiceError::InvalidArgument { .. }), "{value}");
        }
        assert!(VersionSpec::from("not a range").requirements().is_err());
    }
}
