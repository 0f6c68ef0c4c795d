//! Verbose "handled / not handled" event tracing.
//!
//! With verbose mode on, every event an expectation or dispatch handler
//! examines is printed to stdout as `handled, <event>` or
//! `not handled, <event>`. Lines are colored (green / red) only when stdout
//! is a terminal.

use std::{
    borrow::Cow,
    io::{IsTerminal, Write},
};

use crate::{Event, Label};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Prefix length the colorizer keys on.
const PREFIX_LEN: usize = "handled,".len();

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Diagnostics {
    enabled: bool,
    color: bool,
}

impl Diagnostics {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            color: enabled && std::io::stdout().is_terminal(),
        }
    }

    pub(crate) fn handled(&self, event: &Event) {
        self.report(true, event);
    }

    pub(crate) fn not_handled(&self, event: &Event) {
        self.report(false, event);
    }

    fn report(&self, handled: bool, event: &Event) {
        tracing::trace!(event_id = %event.id(), label = %event.label(), handled, "event examined");
        if !self.enabled {
            return;
        }
        let line = render(handled, event);
        let line = if self.color { colorize(&line) } else { Cow::Borrowed(line.as_str()) };
        // stdout may be closed under a test runner; diagnostics are best effort.
        let _ = writeln!(std::io::stdout().lock(), "{line}");
    }
}

pub(crate) fn render(handled: bool, event: &Event) -> String {
    if handled {
        format!("handled, {event}")
    } else {
        format!("not handled, {event}")
    }
}

/// Green for lines starting `handled,`, red for `not hand`, anything else
/// unchanged.
pub(crate) fn colorize(line: &str) -> Cow<'_, str> {
    let color = match line.get(..PREFIX_LEN) {
        Some("handled,") => GREEN,
        Some("not hand") => RED,
        _ => return Cow::Borrowed(line),
    };
    Cow::Owned(format!("{color}{line}{RESET}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_prefixes() {
        let event = Event::custom("sig-A");
        assert_eq!(render(true, &event), "handled, sig-A");
        assert_eq!(render(false, &event), "not handled, sig-A");
    }

    #[test]
    fn colorize_by_prefix() {
        assert_eq!(colorize("handled, x"), "\x1b[32mhandled, x\x1b[0m");
        assert_eq!(colorize("not handled, x"), "\x1b[31mnot handled, x\x1b[0m");
        assert_eq!(colorize("other"), "other");
        assert_eq!(colorize(""), "");
    }

    #[test]
    fn disabled_never_colors() {
        let diag = Diagnostics::new(false);
        assert!(!diag.color);
        diag.handled(&Event::custom("quiet"));
    }
}
