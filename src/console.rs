// src/console.rs - Operator console commands
use std::str::FromStr;
use tokio::sync::mpsc;

pub use crate::error::CommandParseError;

/// Longer lines are rejected without parsing.
pub const MAX_COMMAND_LEN: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    Status,
    Reset,
    Wdt,
    TestMaster,
    MasterInfo,
    Sync,
    Help,
}

impl FromStr for ConsoleCommand {
    type Err = CommandParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim();
        if line.len() > MAX_COMMAND_LEN {
            return Err(CommandParseError::TooLong(line.len()));
        }
        match line.to_ascii_lowercase().as_str() {
            "" => Err(CommandParseError::Empty),
            "status" => Ok(ConsoleCommand::Status),
            "reset" => Ok(ConsoleCommand::Reset),
            "wdt" => Ok(ConsoleCommand::Wdt),
            "testmaster" => Ok(ConsoleCommand::TestMaster),
            "masterinfo" => Ok(ConsoleCommand::MasterInfo),
            "sync" => Ok(ConsoleCommand::Sync),
            "help" => Ok(ConsoleCommand::Help),
            other => Err(CommandParseError::Unknown(other.to_string())),
        }
    }
}

pub const HELP: &str = "\
Commands:
  status      servers, fail counts, network and watchdog
  reset       graceful restart
  wdt         watchdog record
  testmaster  probe the master link
  masterinfo  configuration ingest state
  sync        precision clock and delivery window
  help        this list";

/// Read stdin lines on a helper thread and forward them to the loop.
///
/// The thread ends when stdin closes or the receiver is dropped.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(8);
    let spawned = std::thread::Builder::new()
        .name("console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            let mut line = String::new();
            loop {
                line.clear();
                match stdin.read_line(&mut line) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if tx.blocking_send(line.clone()).is_err() {
                            break;
                        }
                    }
                }
            }
        });
    if let Err(e) = spawned {
        tracing::warn!("Console unavailable: {}", e);
    }
    rx
}
