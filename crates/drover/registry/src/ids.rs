//! Store naming

/// Issues store names from a sequence owned by one deployment parse.
///
/// Names only show up in diagnostics, but they must be distinct within a run
/// so that two constraints with the same selector can be told apart in logs.
#[derive(Debug, Clone)]
pub struct StoreIdSequence {
    prefix: String,
    next: u32,
}

impl StoreIdSequence {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
        }
    }

    pub fn next_name(&mut self) -> String {
        self.next += 1;
        format!("{}-{}", self.prefix, self.next)
    }

    /// Number of names issued so far
    pub fn issued(&self) -> u32 {
        self.next
    }
}

impl Default for StoreIdSequence {
    fn default() -> Self {
        Self::new("store")
    }
}
