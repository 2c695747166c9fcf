use std::fmt;

/// Which of a process's banks a record lives in. Declaration order is the
/// fixed scan priority: master first, then session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BankKind {
    Master,
    Session,
}

impl BankKind {
    pub const ALL: [BankKind; 2] = [BankKind::Master, BankKind::Session];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            BankKind::Master => "master",
            BankKind::Session => "session",
        }
    }
}

impl fmt::Display for BankKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reference to one record: the bank it lives in and the byte offset of its
/// first byte. Only meaningful until that bank is rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LineId {
    pub bank: BankKind,
    pub offset: u32,
}

impl LineId {
    #[must_use]
    pub fn new(bank: BankKind, offset: u32) -> Self {
        Self { bank, offset }
    }
}

impl fmt::Display for LineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.bank, self.offset)
    }
}
