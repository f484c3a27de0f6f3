use std::fmt;

/// Redo-log sequence number: increases by one for every archived/online log
/// in a thread, regardless of `resetlogs` incarnation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Seq(pub u32);

impl Seq {
    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for Seq {
    fn from(value: u32) -> Self {
        Seq(value)
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
