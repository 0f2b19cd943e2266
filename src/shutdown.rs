use std::io::{self, BufRead};

use tokio::signal::ctrl_c;
use tracing::{info, warn};

use crate::signal::RunControl;

/// What a line typed on the console asks the run to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Pause,
    Resume,
    Stop,
}

impl ConsoleCommand {
    pub fn parse(line: &str) -> Option<Self> {
        match line.trim().to_ascii_lowercase().as_str() {
            "p" | "pause" => Some(Self::Pause),
            "r" | "resume" => Some(Self::Resume),
            "s" | "q" | "stop" | "quit" => Some(Self::Stop),
            _ => None,
        }
    }

    fn apply(self, control: &RunControl) {
        match self {
            Self::Pause => control.request_pause(),
            Self::Resume => control.request_resume(),
            Self::Stop => control.request_stop(),
        }
    }
}

/// Turns the first Ctrl-C into a stop request.
pub fn setup_shutdown_handler(control: RunControl) {
    tokio::spawn(async move {
        match ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal (Ctrl-C)");
                control.request_stop();
            }
            Err(e) => warn!("Error setting up signal handler: {}", e),
        }
    });
}

/// Reads `pause` / `resume` / `stop` commands from stdin.
///
/// The reader runs on a detached OS thread so a blocked read never holds
/// the runtime open once the run is over.
pub fn spawn_console_controls(control: RunControl) {
    let spawned = std::thread::Builder::new()
        .name("console-controls".into())
        .spawn(move || forward_commands(io::stdin().lock(), &control));
    if let Err(e) = spawned {
        warn!("Console controls unavailable: {}", e);
    }
}

/// Applies every recognised command read from `input` until it ends.
fn forward_commands(input: impl BufRead, control: &RunControl) {
    for line in input.lines() {
        match line {
            Ok(line) => match ConsoleCommand::parse(&line) {
                Some(command) => command.apply(control),
                None if line.trim().is_empty() => {}
                None => warn!("Unknown command '{}' (pause, resume, stop)", line.trim()),
            },
            Err(e) => {
                warn!("Console input unavailable: {}", e);
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_console_commands() {
        assert_eq!(ConsoleCommand::parse(" Pause\n"), Some(ConsoleCommand::Pause));
        assert_eq!(ConsoleCommand::parse("r"), Some(ConsoleCommand::Resume));
        assert_eq!(ConsoleCommand::parse("stop"), Some(ConsoleCommand::Stop));
        assert_eq!(ConsoleCommand::parse("louder"), None);
    }

    #[test]
    fn applied_commands_drive_the_signal() {
        let control = RunControl::new();
        let signal = control.signal();

        ConsoleCommand::Pause.apply(&control);
        assert!(signal.is_paused());
        ConsoleCommand::Resume.apply(&control);
        assert!(!signal.is_paused());
        ConsoleCommand::Stop.apply(&control);
        assert!(signal.is_cancelled());
    }

    #[test]
    fn forwards_typed_lines_until_input_ends() {
        let control = RunControl::new();
        let signal = control.signal();

        forward_commands(io::Cursor::new("pause\n\nlouder\n"), &control);
        assert!(signal.is_paused());
        assert!(!signal.is_cancelled());

        forward_commands(io::Cursor::new("resume\nstop"), &control);
        assert!(!signal.is_paused());
        assert!(signal.is_cancelled());
    }
}
