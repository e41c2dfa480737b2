// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{io, thread};

use tokio::sync::mpsc::Sender;
use tracing::{debug, info, span, warn, Level};

use crate::trigger::ManualCommand;

const SOURCE: &str = "keyboard";
const STOP: &str = "stop";
const QUIT: &str = "quit";

/// Starts and stops clips by their debug trigger from the terminal.
pub struct Driver {
    triggers: Vec<String>,
}

impl Driver {
    /// Creates a driver. The triggers are only used for the prompt.
    pub fn new(triggers: Vec<String>) -> Driver {
        Driver { triggers }
    }

    /// Reads and dispatches one line. Returns false once input is exhausted or a
    /// quit was requested.
    fn monitor_io<R, W>(
        commands_tx: &Sender<ManualCommand>,
        triggers: &[String],
        mut reader: R,
        mut writer: W,
    ) -> Result<bool, io::Error>
    where
        R: io::BufRead,
        W: io::Write,
    {
        write!(
            writer,
            "Trigger ({}), {} <trigger>, {}: ",
            triggers.join(", "),
            STOP,
            QUIT,
        )?;
        writer.flush()?;
        let mut input: String = String::default();
        if reader.read_line(&mut input)? == 0 {
            return Ok(false);
        }

        let input = input.trim();
        let words: Vec<&str> = input.split_whitespace().collect();
        let command = match words.as_slice() {
            [] => return Ok(true),
            [QUIT] => ManualCommand::Shutdown,
            [STOP, trigger] => ManualCommand::Stop {
                source: SOURCE.to_string(),
                trigger: trigger.to_string(),
            },
            [STOP, ..] => {
                warn!(input = input, "Unrecognized input");
                return Ok(true);
            }
            _ => ManualCommand::Start {
                source: SOURCE.to_string(),
                trigger: input.to_string(),
            },
        };

        debug!(command = ?command, "Keyboard command.");
        let keep_going = command != ManualCommand::Shutdown;
        commands_tx
            .blocking_send(command)
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e))?;
        Ok(keep_going)
    }
}

impl super::Driver for Driver {
    fn monitor_events(
        &self,
        commands_tx: Sender<ManualCommand>,
    ) -> thread::JoinHandle<Result<(), io::Error>> {
        let triggers = self.triggers.clone();
        thread::spawn(move || {
            let span = span!(Level::INFO, "keyboard driver");
            let _enter = span.enter();

            info!("Keyboard driver started.");

            while Self::monitor_io(&commands_tx, &triggers, io::stdin().lock(), io::stdout())? {}

            info!("Keyboard driver stopped.");
            Ok(())
        })
    }
}
