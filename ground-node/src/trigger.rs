//! External shutdown triggers
//!
//! - Ctrl-C (SIGINT) stops every loop.
//! - The console accepts `q` to stop every loop, and `key <code> <0|1>` /
//!   `axis <code> <value>` lines which are fed to the console gamepad.

use crate::error::{Error, Result};
use crate::input::InputEvent;
use crate::run_state::RunState;
use crossbeam_channel::Sender;
use log::{info, warn};
use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Key that stops the node
pub const QUIT_KEY: &str = "q";

/// Install the Ctrl-C handler
pub fn install_ctrl_c(run_state: Arc<RunState>) -> Result<()> {
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        run_state.stop_all();
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))
}

/// Result of one console line
#[derive(Debug, PartialEq, Eq)]
pub enum ConsoleAction {
    Quit,
    Event(InputEvent),
    Ignored,
}

/// Interpret one console line
pub fn parse_console_line(line: &str) -> ConsoleAction {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleAction::Ignored;
    }
    if line.eq_ignore_ascii_case(QUIT_KEY) {
        return ConsoleAction::Quit;
    }
    match line.parse::<InputEvent>() {
        Ok(event) => ConsoleAction::Event(event),
        Err(e) => {
            warn!("Ignoring console input: {}", e);
            ConsoleAction::Ignored
        }
    }
}

/// Read console lines until `q` or end of input
pub fn watch_console<R: Read>(input: R, run_state: &RunState, events: &Sender<InputEvent>) {
    for line in BufReader::new(input).lines() {
        let Ok(line) = line else {
            break;
        };
        match parse_console_line(&line) {
            ConsoleAction::Quit => {
                info!("Quit key pressed");
                run_state.stop_all();
                break;
            }
            ConsoleAction::Event(event) => {
                if events.send(event).is_err() {
                    break;
                }
            }
            ConsoleAction::Ignored => {}
        }
    }
}

/// Watch stdin on a detached thread
///
/// The thread blocks on stdin and is never joined.
pub fn spawn_console(run_state: Arc<RunState>, events: Sender<InputEvent>) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || watch_console(std::io::stdin(), &run_state, &events))
        .map_err(|source| Error::ThreadSpawn {
            name: "console",
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_console_line() {
        assert_eq!(parse_console_line("q\n"), ConsoleAction::Quit);
        assert_eq!(parse_console_line(" Q "), ConsoleAction::Quit);
        assert_eq!(parse_console_line(""), ConsoleAction::Ignored);
        assert_eq!(parse_console_line("hello"), ConsoleAction::Ignored);
        assert_eq!(
            parse_console_line("axis 0 100"),
            ConsoleAction::Event(InputEvent::axis(0, 100))
        );
    }

    #[test]
    fn test_watch_console_forwards_events_then_quits() {
        let state = RunState::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        let input = Cursor::new("axis 1 10\nkey 304 1\nq\naxis 2 5\n");

        watch_console(input, &state, &tx);

        assert!(state.all_stopped());
        let events: Vec<InputEvent> = rx.try_iter().collect();
        assert_eq!(events, vec![InputEvent::axis(1, 10), InputEvent::key(304, true)]);
    }

    #[test]
    fn test_watch_console_end_of_input_keeps_running() {
        let state = RunState::new();
        let (tx, _rx) = crossbeam_channel::unbounded();
        watch_console(Cursor::new("axis 1 10\n"), &state, &tx);
        assert!(!state.all_stopped());
    }
}
