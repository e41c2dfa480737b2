// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
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
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender as FeedSender};
use parking_lot::Mutex;
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, info, span, Level};

use crate::trigger::TriggerEvent;

/// How long the reader thread waits for input before checking the stop flag.
const READ_TIMEOUT: Duration = Duration::from_millis(10);

/// A mock device. Raw MIDI bytes pushed with `mock_event` are read back by a
/// dedicated reader thread, the same way a hardware input delivers them.
#[derive(Clone)]
pub struct Device {
    name: String,
    feed: FeedSender<Vec<u8>>,
    input: Receiver<Vec<u8>>,
    closed: Arc<AtomicBool>,
    reader: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        let (feed, input) = crossbeam_channel::unbounded();
        Device {
            name: name.to_string(),
            feed,
            input,
            closed: Arc::new(AtomicBool::new(false)),
            reader: Arc::new(Mutex::new(None)),
        }
    }

    #[cfg(test)]
    /// Feeds raw MIDI bytes into the device.
    pub fn mock_event(&self, event: &[u8]) {
        if self.feed.send(event.to_vec()).is_err() {
            error!("Mock MIDI feed is closed.");
        }
    }

    #[cfg(test)]
    /// Whether the reader thread is running.
    pub fn is_watching(&self) -> bool {
        self.reader
            .lock()
            .as_ref()
            .is_some_and(|reader| !reader.is_finished())
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn watch_events(&self, sender: Sender<TriggerEvent>) -> Result<(), Box<dyn Error>> {
        let mut reader = self.reader.lock();
        if reader.is_some() {
            return Err("Already watching events.".into());
        }

        let name = self.name.clone();
        let input = self.input.clone();
        let closed = self.closed.clone();
        *reader = Some(
            thread::Builder::new()
                .name(format!("midi-{}", self.name))
                .spawn(move || {
                    let span = span!(Level::INFO, "watch events (mock)", device = name);
                    let _enter = span.enter();
                    info!("Watching MIDI events.");

                    while !closed.load(Ordering::Relaxed) {
                        let raw = match input.recv_timeout(READ_TIMEOUT) {
                            Ok(raw) => raw,
                            Err(RecvTimeoutError::Timeout) => continue,
                            Err(RecvTimeoutError::Disconnected) => break,
                        };
                        let Some(event) = TriggerEvent::from_raw(&raw, Instant::now()) else {
                            debug!(raw = ?raw, "Ignoring non-note MIDI event.");
                            continue;
                        };
                        if sender.blocking_send(event).is_err() {
                            info!("Trigger queue closed, no longer watching events.");
                            break;
                        }
                    }
                })?,
        );

        Ok(())
    }

    fn stop_watch_events(&self) {
        self.closed.store(true, Ordering::Relaxed);
        let reader = self.reader.lock().take();
        if let Some(reader) = reader {
            if reader.join().is_err() {
                error!(device = self.name, "MIDI reader thread panicked.");
            }
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
