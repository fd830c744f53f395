use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A Gradle version such as `8.5`, `7.6.1` or `8.0-rc-1`.
///
/// Ordering compares the numeric parts first; a release sorts after every pre-release or
/// snapshot with the same numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GradleVersion {
    major: u32,
    minor: u32,
    patch: u32,
    qualifier: Option<String>,
    text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid Gradle version `{0}`")]
pub struct InvalidGradleVersion(pub String);

impl GradleVersion {
    pub const fn release(major: u32, minor: u32) -> ReleaseVersion {
        ReleaseVersion { major, minor }
    }

    pub fn parse(text: &str) -> Result<Self, InvalidGradleVersion> {
        let trimmed = text.trim();
        let invalid = || InvalidGradleVersion(text.to_string());
        let (numbers, qualifier) = match trimmed.split_once('-') {
            Some((numbers, qualifier)) if !qualifier.is_empty() => {
                (numbers, Some(qualifier.to_string()))
            }
            Some(_) => return Err(invalid()),
            None => (trimmed, None),
        };

        let mut parts = [0u32; 3];
        let mut count = 0;
        for part in numbers.split('.') {
            if count == parts.len() {
                return Err(invalid());
            }
            parts[count] = part.parse().map_err(|_| invalid())?;
            count += 1;
        }
        if count < 2 {
            return Err(invalid());
        }

        Ok(Self {
            major: parts[0],
            minor: parts[1],
            patch: parts[2],
            qualifier,
            text: trimmed.to_string(),
        })
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn patch(&self) -> u32 {
        self.patch
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    pub fn is_release(&self) -> bool {
        self.qualifier.is_none()
    }

    /// `true` when this version is at or above the release `min`.
    pub fn at_least(&self, min: ReleaseVersion) -> bool {
        match (self.major, self.minor).cmp(&(min.major, min.minor)) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => self.patch > 0 || self.is_release(),
        }
    }
}

/// A `major.minor` release boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReleaseVersion {
    pub major: u32,
    pub minor: u32,
}

impl fmt::Display for ReleaseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Ord for GradleVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.major, self.minor, self.patch)
            .cmp(&(other.major, other.minor, other.patch))
            .then_with(|| match (&self.qualifier, &other.qualifier) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(a), Some(b)) => a.cmp(b),
            })
    }
}

impl PartialOrd for GradleVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for GradleVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GradleVersion {}

impl fmt::Display for GradleVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl FromStr for GradleVersion {
    type Err = InvalidGradleVersion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for GradleVersion {
    type Error = InvalidGradleVersion;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<GradleVersion> for String {
    fn from(value: GradleVersion) -> Self {
        value.text
    }
}

/// First release whose tooling API can fetch every project's models in one build action.
pub const BULK_FETCH_MIN_VERSION: ReleaseVersion = GradleVersion::release(1, 8);

/// First release the tooling API connects to at all.
pub const MIN_SUPPORTED_VERSION: ReleaseVersion = GradleVersion::release(1, 0);

struct KnownIssue {
    /// Inclusive lower bound.
    from: ReleaseVersion,
    /// Exclusive upper bound.
    until: ReleaseVersion,
    message: &'static str,
}

const KNOWN_ISSUES: &[KnownIssue] = &[
    KnownIssue {
        from: GradleVersion::release(1, 8),
        until: GradleVersion::release(1, 9),
        message: "the tooling API of this version may report an incomplete project tree for \
                  builds that configure projects on demand; consider the compatible loading strategy",
    },
    KnownIssue {
        from: GradleVersion::release(2, 0),
        until: GradleVersion::release(2, 1),
        message: "model fetches of this version can hang when the daemon JVM differs from the \
                  JDK selected for the build; set an explicit java home",
    },
];

/// Advisories for versions with known tooling problems. Empty for unaffected versions.
pub fn known_issues(version: &GradleVersion) -> Vec<String> {
    let mut out = Vec::new();
    if !version.at_least(MIN_SUPPORTED_VERSION) {
        out.push(format!(
            "Gradle {version} predates {MIN_SUPPORTED_VERSION} and is not supported by the tooling API"
        ));
    }
    for issue in KNOWN_ISSUES {
        if version.at_least(issue.from) && !version.at_least(issue.until) {
            out.push(format!("Gradle {version}: {}", issue.message));
        }
    }
    out
}
