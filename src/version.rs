use crate::weak_error;
use once_cell::sync;
use regex::Regex;
use std::fmt::{Display, Formatter};

/// Debugger backend version (major, minor, patch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(pub (u32, u32, u32));

impl Version {
    /// Parse gdb version from the first line of a `-gdb-version` banner, like:
    /// "GNU gdb (Ubuntu 12.1-0ubuntu1~22.04) 12.1",
    /// "GNU gdb 6.8-debian",
    /// "GNU gdb (GDB) Red Hat Enterprise Linux 7.6.1-94.el7".
    pub fn gdb_parse(s: &str) -> Option<Self> {
        static V_RE: sync::Lazy<Regex> = sync::Lazy::new(|| {
            Regex::new(r"GNU gdb\s+(?:\([^)]*\)\s*)?(?:[^\d\s]\S*\s+)*(\d+)\.(\d+)(?:\.(\d+))?")
                .expect("must compile")
        });

        let caps = V_RE.captures(s)?;
        let major = weak_error!(caps[1].parse::<u32>())?;
        let minor = weak_error!(caps[2].parse::<u32>())?;
        let patch = match caps.get(3) {
            None => 0,
            Some(m) => weak_error!(m.as_str().parse::<u32>())?,
        };
        Some(Version((major, minor, patch)))
    }

    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Version((major, minor, patch))
    }
}

impl Default for Version {
    fn default() -> Self {
        // the oldest backend with MI2 output is default
        Version((6, 8, 0))
    }
}

impl Display for Version {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.0;
        write!(f, "{major}.{minor}.{patch}")
    }
}

/// Execute expression depending on backend version.
#[macro_export]
macro_rules! version_switch {
    ($gdb_v:expr, $($v1:tt ..= $v2:expr => $code: expr),+ $(,)?) => {
        $(
            if $gdb_v >= $crate::version::Version($v1) && $gdb_v <= $v2 {
                Some($code)
            } else
        )*
        {
            None
        }
    };
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_gdb_banner_parsing() {
        struct TestCase {
            banner: &'static str,
            expected: Option<Version>,
        }
        let cases = vec![
            TestCase {
                banner: "GNU gdb (GDB) 12.1",
                expected: Some(Version((12, 1, 0))),
            },
            TestCase {
                banner: "GNU gdb (Ubuntu 12.1-0ubuntu1~22.04) 12.1",
                expected: Some(Version((12, 1, 0))),
            },
            TestCase {
                banner: "GNU gdb 6.8-debian",
                expected: Some(Version((6, 8, 0))),
            },
            TestCase {
                banner: "GNU gdb (GDB) Red Hat Enterprise Linux 7.6.1-94.el7",
                expected: Some(Version((7, 6, 1))),
            },
            TestCase {
                banner: "GNU gdb (GDB) 7.12.1\nCopyright (C) 2017",
                expected: Some(Version((7, 12, 1))),
            },
            TestCase {
                banner: "LLDB version 15",
                expected: None,
            },
        ];

        for tc in cases {
            assert_eq!(Version::gdb_parse(tc.banner), tc.expected, "{}", tc.banner);
        }
    }

    #[test]
    fn test_version_order_and_switch() {
        assert!(Version::new(7, 12, 0) > Version::new(7, 2, 0));
        assert!(Version::new(10, 0, 0) > Version::new(7, 12, 1));

        let v = Version::new(7, 4, 0);
        let res = version_switch!(
            v,
            (6, 0, 0) ..= Version((6, u32::MAX, u32::MAX)) => "old",
            (7, 0, 0) ..= Version((u32::MAX, u32::MAX, u32::MAX)) => "new",
        );
        assert_eq!(res, Some("new"));
        assert_eq!(Version::default().to_string(), "6.8.0");
    }
}
