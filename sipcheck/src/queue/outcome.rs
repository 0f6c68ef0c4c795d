use std::{fmt, hash};

/// Returned by a dispatch handler to steer the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, hash::Hash, Default)]
pub enum HandlerOutcome {
    /// Keep dispatching. This is the default.
    #[default]
    Continue,
    /// The test is done; stop dispatching and return `Ok(())`.
    Complete,
}

impl HandlerOutcome {
    pub fn is_complete(self) -> bool {
        self == HandlerOutcome::Complete
    }
}

impl From<bool> for HandlerOutcome {
    /// `true` means complete.
    fn from(done: bool) -> Self {
        if done {
            HandlerOutcome::Complete
        } else {
            HandlerOutcome::Continue
        }
    }
}

impl fmt::Display for HandlerOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerOutcome::Continue => write!(f, "Continue"),
            HandlerOutcome::Complete => write!(f, "Complete"),
        }
    }
}
