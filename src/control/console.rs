//! Operator panel on the terminal.
//!
//! A background thread reads stdin line by line:
//!
//! - `q`: exit
//! - `+`: increase the overload
//! - `-`: decrease the overload
//! - `l`: toggle the load switch
//! - `r`: reserved key
//!
//! Key presses are latched until the control task reads them.

use crate::control::{Keys, OperatorPanel, Switches};
use parking_lot::Mutex;
use std::io::{self, BufRead};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// One operator action typed on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleInput {
    /// Momentary key press
    Press(Keys),
    /// Flip the load switch
    ToggleLoad,
}

/// Parse one console line. Unknown input yields `None`.
pub fn parse(line: &str) -> Option<ConsoleInput> {
    match line.trim() {
        "q" | "Q" => Some(ConsoleInput::Press(Keys::EXIT)),
        "+" => Some(ConsoleInput::Press(Keys::INCREASE)),
        "-" => Some(ConsoleInput::Press(Keys::DECREASE)),
        "r" | "R" => Some(ConsoleInput::Press(Keys::RESERVED)),
        "l" | "L" => Some(ConsoleInput::ToggleLoad),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct Latched {
    keys: Keys,
    switches: Switches,
}

/// Panel fed from stdin (or by hand in tests).
#[derive(Debug, Clone, Default)]
pub struct ConsolePanel {
    state: Arc<Mutex<Latched>>,
}

impl ConsolePanel {
    /// Operator help, one line per command.
    pub const HELP: [&'static str; 4] = [
        "l + Enter: enable/disable CPU overload",
        "- + Enter: reduce CPU overload",
        "+ + Enter: increase CPU overload",
        "q + Enter: exit the program",
    ];

    /// Panel with no input thread; inputs come from [`ConsolePanel::feed`].
    pub fn detached() -> Self {
        Self::default()
    }

    /// Panel with an `operator-console` thread reading stdin.
    ///
    /// The thread is never joined: it ends with stdin or with the process.
    pub fn spawn_stdin() -> io::Result<Self> {
        let panel = Self::detached();
        let feeder = panel.clone();

        thread::Builder::new()
            .name("operator-console".into())
            .spawn(move || {
                for line in io::stdin().lock().lines() {
                    match line {
                        Ok(line) => {
                            if !feeder.feed(&line) {
                                debug!(input = %line.trim(), "Ignored console input");
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Console input failed");
                            break;
                        }
                    }
                }
                debug!("Console input closed");
            })?;

        Ok(panel)
    }

    /// Apply one console line. Returns whether it was recognised.
    pub fn feed(&self, line: &str) -> bool {
        let Some(input) = parse(line) else {
            return false;
        };
        let mut state = self.state.lock();
        match input {
            ConsoleInput::Press(keys) => state.keys |= keys,
            ConsoleInput::ToggleLoad => state.switches.toggle(Switches::LOAD),
        }
        true
    }
}

impl OperatorPanel for ConsolePanel {
    fn read_keys(&mut self) -> Keys {
        std::mem::take(&mut self.state.lock().keys)
    }

    fn read_switches(&mut self) -> Switches {
        self.state.lock().switches
    }
}
