use std::fmt;
use std::str::FromStr;

/// Oracle transaction identifier: undo-segment number, slot, sequence.
///
/// Ordering is the lexicographic triple `(usn, slt, sqn)`, matching how the
/// C++ source compares transaction table entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Xid {
    pub usn: u16,
    pub slt: u16,
    pub sqn: u32,
}

impl Xid {
    pub const ZERO: Xid = Xid { usn: 0, slt: 0, sqn: 0 };

    pub fn new(usn: u16, slt: u16, sqn: u32) -> Self {
        Self { usn, slt, sqn }
    }

    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }

    /// The `(usn, slt)` pair rollback vectors address the transaction table
    /// with — the `sqn` is not known until the `5.2` begin vector arrives.
    pub fn truncated(self) -> (u16, u16) {
        (self.usn, self.slt)
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}.{:03x}.{:08x}", self.usn, self.slt, self.sqn)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("malformed xid string: {0:?}")]
pub struct XidParseError(String);

impl FromStr for Xid {
    type Err = XidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || XidParseError(s.to_string());
        let rest = s.strip_prefix("0x").ok_or_else(err)?;
        let mut parts = rest.split('.');
        let usn = u16::from_str_radix(parts.next().ok_or_else(err)?, 16).map_err(|_| err())?;
        let slt = u16::from_str_radix(parts.next().ok_or_else(err)?, 16).map_err(|_| err())?;
        let sqn = u32::from_str_radix(parts.next().ok_or_else(err)?, 16).map_err(|_| err())?;
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(Xid { usn, slt, sqn })
    }
}
