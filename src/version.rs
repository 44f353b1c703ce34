use crate::weak_error;
use once_cell::sync;
use regex::Regex;
use std::fmt::{Display, Formatter};

/// Version of a gdb binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GdbVersion(pub (u32, u32));

impl GdbVersion {
    /// Parse gdb version from the `gdb-version` banner, strings like:
    /// "GNU gdb (GDB) 13.2" or "GNU gdb (Ubuntu 12.1-0ubuntu1~22.04) 12.1".
    pub fn parse(s: &str) -> Option<Self> {
        static V_RE: sync::Lazy<Regex> = sync::Lazy::new(|| {
            Regex::new(r"GNU gdb (?:\([^)]*\) )?(\d+)\.(\d+)").expect("must compile")
        });

        if let Some((_, [major, minor])) = V_RE.captures_iter(s).next().map(|c| c.extract()) {
            let major = weak_error!(major.parse::<u32>())?;
            let minor = weak_error!(minor.parse::<u32>())?;
            return Some(GdbVersion((major, minor)));
        }
        None
    }

    /// Several inferiors in one gdb appeared in 7.2.
    pub fn supports_multi_inferior(&self) -> bool {
        *self >= GdbVersion((7, 2))
    }
}

impl Default for GdbVersion {
    fn default() -> Self {
        // the first version with mi3 interpreter
        GdbVersion((9, 1))
    }
}

impl Display for GdbVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.0 .0, self.0 .1)
    }
}
