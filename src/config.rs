// Copyright (C) 2024 Michael Wilson <mike@mdwn.dev>
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
use std::error::Error;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use tokio::sync::mpsc::{self, Sender};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::catalog::Catalog;
use crate::controller::{keyboard, Driver};
use crate::scheduler::clock::SystemClock;
use crate::scheduler::runner::SchedulerLoop;
use crate::scheduler::stats::{SchedulerStats, StatsSnapshot};
use crate::scheduler::Scheduler;
use crate::trigger::ManualCommand;
use crate::{engine, midi};

mod clip;
pub mod error;
mod player;

pub use self::clip::{note_from_name, parse_duration, ClipCatalog, ClipDefinition};
pub use self::player::Player;

/// Size of the manual command queue. Commands are typed by hand.
const COMMAND_QUEUE_CAPACITY: usize = 16;

/// Loads and validates a clip catalog file.
pub fn load_catalog(path: &Path) -> Result<Catalog, error::ConfigError> {
    ClipCatalog::load(path)
}

/// A running installation: the scheduler loop and everything feeding it.
pub struct Installation {
    scheduler: JoinHandle<StatsSnapshot>,
    midi_device: Option<Arc<dyn midi::Device>>,
    keyboard: Option<thread::JoinHandle<Result<(), io::Error>>>,
    commands_tx: Sender<ManualCommand>,
    stats: Arc<SchedulerStats>,
}

impl Installation {
    /// A sender for manual commands, including shutdown.
    pub fn commands(&self) -> Sender<ManualCommand> {
        self.commands_tx.clone()
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        self.stats.clone()
    }

    /// Waits for the scheduler loop to finish, then stops the trigger source.
    pub async fn join(self) -> Result<StatsSnapshot, Box<dyn Error>> {
        let stats = self.scheduler.await?;
        if let Some(midi_device) = &self.midi_device {
            midi_device.stop_watch_events();
        }
        if let Some(keyboard) = self.keyboard {
            // The keyboard thread may be blocked reading stdin, which only ends
            // with the process, so it is only reaped if it already exited.
            if keyboard.is_finished() {
                match keyboard.join() {
                    Ok(Err(e)) => warn!(err = %e, "Keyboard driver failed."),
                    Err(_) => error!("Keyboard driver panicked."),
                    Ok(Ok(())) => {}
                }
            }
        }
        Ok(stats)
    }
}

/// Initializes the installation from the given player config and starts it. Must
/// be called from within a tokio runtime.
pub fn init_installation(player_path: &Path) -> Result<Installation, Box<dyn Error>> {
    let player = Player::deserialize(player_path)?;
    let catalog = Arc::new(load_catalog(&player.clips_path(player_path))?);
    let engine = engine::get_engine(player.engine())?;
    let midi_device = player.midi_device().map(midi::get_device).transpose()?;

    let scheduler = Scheduler::new(
        catalog.clone(),
        engine,
        Arc::new(SystemClock),
        player.max_concurrent_sessions(),
        player.canvas(),
        player.position_poll_interval()?,
    )?;

    let (triggers_tx, triggers_rx) = mpsc::channel(player.trigger_queue_capacity());
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
    let scheduler_loop = SchedulerLoop::new(scheduler, triggers_rx, commands_rx);
    let stats = scheduler_loop.stats();
    let scheduler = tokio::spawn(scheduler_loop.run());

    match &midi_device {
        Some(midi_device) => midi_device.watch_events(triggers_tx)?,
        None => warn!("No MIDI device configured, only manual triggers are available."),
    }

    let keyboard = if player.keyboard() {
        let triggers = catalog
            .debug_triggers()
            .into_iter()
            .map(String::from)
            .collect();
        Some(keyboard::Driver::new(triggers).monitor_events(commands_tx.clone()))
    } else {
        None
    };

    {
        let commands_tx = commands_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(err = %e, "Unable to listen for interrupts.");
                return;
            }
            info!("Interrupted, shutting down.");
            // The loop may already be gone.
            let _ = commands_tx.send(ManualCommand::Shutdown).await;
        });
    }

    info!(
        clips = catalog.len(),
        midi_device = player.midi_device(),
        engine = player.engine(),
        "Installation started."
    );

    Ok(Installation {
        scheduler,
        midi_device,
        keyboard,
        commands_tx,
        stats,
    })
}
