// restorecheck/src/utils/version.rs
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// `major.minor.patch` as reported by the database engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EngineVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

/// First release that supports `ALTER INSTANCE DISABLE INNODB REDO_LOG`.
pub const REDO_LOG_TOGGLE_MIN: EngineVersion = EngineVersion::new(8, 0, 21);

impl EngineVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Parses the leading `X.Y.Z` of strings such as `8.0.35-0ubuntu0.22.04.1`.
    /// Returns `None` when no such prefix exists.
    pub fn parse(reported: &str) -> Option<Self> {
        static VERSION_RE: OnceLock<Regex> = OnceLock::new();
        let re = VERSION_RE.get_or_init(|| {
            Regex::new(r"^\s*v?(\d+)\.(\d+)\.(\d+)").expect("version pattern is valid")
        });

        let caps = re.captures(reported)?;
        Some(Self {
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
            patch: caps[3].parse().ok()?,
        })
    }

    /// Unparseable versions never satisfy a minimum.
    pub fn reported_at_least(reported: &str, minimum: EngineVersion) -> bool {
        Self::parse(reported).is_some_and(|v| v >= minimum)
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vendor_suffixes() {
        assert_eq!(EngineVersion::parse("8.0.21"), Some(EngineVersion::new(8, 0, 21)));
        assert_eq!(
            EngineVersion::parse("8.0.35-0ubuntu0.22.04.1"),
            Some(EngineVersion::new(8, 0, 35))
        );
        assert_eq!(EngineVersion::parse("5.7.44-log"), Some(EngineVersion::new(5, 7, 44)));
        assert_eq!(EngineVersion::parse("8.0"), None);
        assert_eq!(EngineVersion::parse("unknown"), None);
    }

    #[test]
    fn test_redo_log_gate() {
        assert!(EngineVersion::reported_at_least("8.0.21", REDO_LOG_TOGGLE_MIN));
        assert!(EngineVersion::reported_at_least("8.4.0", REDO_LOG_TOGGLE_MIN));
        assert!(EngineVersion::reported_at_least("10.0.0", REDO_LOG_TOGGLE_MIN));
        assert!(!EngineVersion::reported_at_least("8.0.20", REDO_LOG_TOGGLE_MIN));
        assert!(!EngineVersion::reported_at_least("5.7.44-log", REDO_LOG_TOGGLE_MIN));
        assert!(!EngineVersion::reported_at_least("", REDO_LOG_TOGGLE_MIN));
    }
}
