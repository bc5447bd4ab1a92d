// src/types.rs

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;

bitflags! {
    /// Categories of change a watch subscribes to.
    ///
    /// This mask is the only externally visible protocol of the monitor, so
    /// the bit assignment is fixed:
    ///
    /// | bit | value  | name          | delivered for                          |
    /// |-----|--------|---------------|----------------------------------------|
    /// | 0   | `0x01` | `file_name`   | file created, deleted or renamed       |
    /// | 1   | `0x02` | `dir_name`    | directory created, deleted or renamed  |
    /// | 2   | `0x04` | `attributes`  | attribute changes                      |
    /// | 3   | `0x08` | `size`        | file size changes                      |
    /// | 4   | `0x10` | `last_write`  | last-write time changes                |
    /// | 5   | `0x20` | `last_access` | last-access time changes               |
    /// | 6   | `0x40` | `creation`    | creation time changes                  |
    /// | 7   | `0x80` | `security`    | permission / ownership changes         |
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChangeFilter: u32 {
        const FILE_NAME = 1 << 0;
        const DIR_NAME = 1 << 1;
        const ATTRIBUTES = 1 << 2;
        const SIZE = 1 << 3;
        const LAST_WRITE = 1 << 4;
        const LAST_ACCESS = 1 << 5;
        const CREATION = 1 << 6;
        const SECURITY = 1 << 7;
    }
}

/// Canonical names, in bit order.
const FLAG_NAMES: [(&str, ChangeFilter); 8] = [
    ("file_name", ChangeFilter::FILE_NAME),
    ("dir_name", ChangeFilter::DIR_NAME),
    ("attributes", ChangeFilter::ATTRIBUTES),
    ("size", ChangeFilter::SIZE),
    ("last_write", ChangeFilter::LAST_WRITE),
    ("last_access", ChangeFilter::LAST_ACCESS),
    ("creation", ChangeFilter::CREATION),
    ("security", ChangeFilter::SECURITY),
];

impl ChangeFilter {
    /// Names, moves, size and content writes. Used when a watch does not
    /// spell out a filter.
    pub const DEFAULT: ChangeFilter = ChangeFilter::FILE_NAME
        .union(ChangeFilter::DIR_NAME)
        .union(ChangeFilter::SIZE)
        .union(ChangeFilter::LAST_WRITE);

    /// Build a filter from a list of category names (see [`FromStr`]).
    pub fn from_names<I, S>(names: I) -> Result<Self, String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut filter = ChangeFilter::empty();
        for name in names {
            filter |= name.as_ref().parse::<ChangeFilter>()?;
        }
        Ok(filter)
    }

    /// Category names set in this filter, in bit order.
    pub fn names(self) -> Vec<&'static str> {
        FLAG_NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect()
    }
}

impl Default for ChangeFilter {
    fn default() -> Self {
        ChangeFilter::DEFAULT
    }
}

impl FromStr for ChangeFilter {
    type Err = String;

    /// Parse a single category name, or `all`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        if wanted == "all" {
            return Ok(ChangeFilter::all());
        }
        FLAG_NAMES
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, flag)| *flag)
            .ok_or_else(|| {
                format!(
                    "invalid change filter: {s} (expected one of file_name, dir_name, attributes, size, last_write, last_access, creation, security, all)"
                )
            })
    }
}

impl fmt::Display for ChangeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("none");
        }
        f.write_str(&self.names().join("|"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_are_fixed() {
        assert_eq!(ChangeFilter::FILE_NAME.bits(), 0x01);
        assert_eq!(ChangeFilter::DIR_NAME.bits(), 0x02);
        assert_eq!(ChangeFilter::ATTRIBUTES.bits(), 0x04);
        assert_eq!(ChangeFilter::SIZE.bits(), 0x08);
        assert_eq!(ChangeFilter::LAST_WRITE.bits(), 0x10);
        assert_eq!(ChangeFilter::LAST_ACCESS.bits(), 0x20);
        assert_eq!(ChangeFilter::CREATION.bits(), 0x40);
        assert_eq!(ChangeFilter::SECURITY.bits(), 0x80);
        assert_eq!(ChangeFilter::all().bits(), 0xFF);
    }

    #[test]
    fn parses_names_case_insensitively() {
        let filter = ChangeFilter::from_names(["File_Name", "last-write", " size "]).unwrap();
        assert_eq!(
            filter,
            ChangeFilter::FILE_NAME | ChangeFilter::LAST_WRITE | ChangeFilter::SIZE
        );
        assert_eq!(ChangeFilter::from_names(["all"]).unwrap(), ChangeFilter::all());
    }

    #[test]
    fn rejects_unknown_names() {
        let err = ChangeFilter::from_names(["file_name", "colour"]).unwrap_err();
        assert!(err.contains("colour"));
    }

    #[test]
    fn display_lists_names_in_bit_order() {
        assert_eq!(ChangeFilter::DEFAULT.to_string(), "file_name|dir_name|size|last_write");
        assert_eq!(ChangeFilter::empty().to_string(), "none");
    }
}
