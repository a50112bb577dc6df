//! dbm-style open flags.

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, StoreError};

/// How the backing file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// `r`: read-only, file must exist.
    Read,
    /// `w`: read/write, file must exist.
    Write,
    /// `c`: read/write, create the file if missing.
    Create,
    /// `n`: read/write, always start from a new empty file.
    New,
}

/// Parsed open flags.
///
/// The string form is one mode character followed by optional modifiers:
///
/// | char | meaning |
/// |------|---------|
/// | `r` `w` `c` `n` | see [`OpenMode`] |
/// | `f` | fast: buffer writes until `sync` or `close` |
/// | `s` | synchronize every write to disk |
/// | `u` | accepted for compatibility, no effect |
///
/// ```rust
/// use kvbridge_store::{OpenFlags, OpenMode};
///
/// let flags: OpenFlags = "cf".parse().unwrap();
/// assert_eq!(flags.mode, OpenMode::Create);
/// assert!(flags.fast);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    pub mode: OpenMode,
    pub fast: bool,
    pub sync_writes: bool,
}

impl OpenFlags {
    pub fn new(mode: OpenMode) -> Self {
        Self {
            mode,
            fast: false,
            sync_writes: false,
        }
    }

    pub fn read_only() -> Self {
        Self::new(OpenMode::Read)
    }

    pub fn create() -> Self {
        Self::new(OpenMode::Create)
    }

    pub fn with_fast(mut self, fast: bool) -> Self {
        self.fast = fast;
        self
    }

    pub fn with_sync_writes(mut self, sync_writes: bool) -> Self {
        self.sync_writes = sync_writes;
        self
    }

    pub fn is_writable(&self) -> bool {
        self.mode != OpenMode::Read
    }

    pub fn parse(flags: &str) -> Result<Self> {
        let invalid = |message: &str| StoreError::InvalidFlags {
            flags: flags.to_string(),
            message: message.to_string(),
        };

        let mut chars = flags.chars();
        let mode = match chars.next() {
            Some('r') => OpenMode::Read,
            Some('w') => OpenMode::Write,
            Some('c') => OpenMode::Create,
            Some('n') => OpenMode::New,
            Some(_) => return Err(invalid("first flag must be one of 'r', 'w', 'c', 'n'")),
            None => return Err(invalid("empty flag string")),
        };

        let mut parsed = Self::new(mode);
        for modifier in chars {
            match modifier {
                'f' => parsed.fast = true,
                's' => parsed.sync_writes = true,
                'u' => {}
                other => return Err(invalid(&format!("unknown modifier '{}'", other))),
            }
        }

        if parsed.fast && parsed.sync_writes {
            return Err(invalid("'f' and 's' are mutually exclusive"));
        }

        Ok(parsed)
    }
}

impl Default for OpenFlags {
    fn default() -> Self {
        Self::read_only()
    }
}

impl FromStr for OpenFlags {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for OpenFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mode = match self.mode {
            OpenMode::Read => 'r',
            OpenMode::Write => 'w',
            OpenMode::Create => 'c',
            OpenMode::New => 'n',
        };
        write!(f, "{}", mode)?;
        if self.fast {
            write!(f, "f")?;
        }
        if self.sync_writes {
            write!(f, "s")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_modes() {
        assert_eq!(OpenFlags::parse("r").unwrap().mode, OpenMode::Read);
        assert_eq!(OpenFlags::parse("w").unwrap().mode, OpenMode::Write);
        assert_eq!(OpenFlags::parse("c").unwrap().mode, OpenMode::Create);
        assert_eq!(OpenFlags::parse("n").unwrap().mode, OpenMode::New);
    }

    #[test]
    fn parses_modifiers() {
        let flags = OpenFlags::parse("cfu").unwrap();
        assert!(flags.fast);
        assert!(!flags.sync_writes);

        let flags = OpenFlags::parse("ws").unwrap();
        assert!(flags.sync_writes);
        assert!(flags.is_writable());
    }

    #[test]
    fn read_only_is_not_writable() {
        assert!(!OpenFlags::read_only().is_writable());
        assert_eq!(OpenFlags::default(), OpenFlags::read_only());
    }

    #[test]
    fn rejects_bad_strings() {
        for bad in ["", "x", "cq", "cfs"] {
            let err = OpenFlags::parse(bad).unwrap_err();
            assert!(matches!(err, StoreError::InvalidFlags { .. }), "{bad}");
        }
    }

    #[test]
    fn display_matches_input() {
        for s in ["r", "c", "nf", "ws"] {
            assert_eq!(s.parse::<OpenFlags>().unwrap().to_string(), s);
        }
    }
}
