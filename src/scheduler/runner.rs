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
use std::sync::Arc;

use tokio::sync::mpsc::{self, Receiver, UnboundedReceiver};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, info_span, Instrument};

use super::stats::{SchedulerStats, StatsSnapshot};
use super::Scheduler;
use crate::engine::EngineEvent;
use crate::trigger::{ManualCommand, TriggerEvent};

/// Drives a scheduler from a single task. Trigger events, manual commands, engine
/// callbacks and timers are all serviced here, one at a time.
pub struct SchedulerLoop {
    scheduler: Scheduler,
    triggers: Receiver<TriggerEvent>,
    commands: Receiver<ManualCommand>,
    engine_events: UnboundedReceiver<EngineEvent>,
}

impl SchedulerLoop {
    /// Creates the loop and routes the engine's callbacks into it.
    pub fn new(
        scheduler: Scheduler,
        triggers: Receiver<TriggerEvent>,
        commands: Receiver<ManualCommand>,
    ) -> SchedulerLoop {
        let (events_tx, engine_events) = mpsc::unbounded_channel();
        {
            let events_tx = events_tx.clone();
            scheduler.engine.on_end_of_stream(Box::new(move |handle| {
                if events_tx.send(EngineEvent::EndOfStream(handle)).is_err() {
                    debug!(handle, "Scheduler loop is gone, dropping end of stream.");
                }
            }));
        }
        scheduler.engine.on_error(Box::new(move |handle, message| {
            if events_tx
                .send(EngineEvent::Error { handle, message })
                .is_err()
            {
                debug!(handle, "Scheduler loop is gone, dropping engine error.");
            }
        }));

        SchedulerLoop {
            scheduler,
            triggers,
            commands,
            engine_events,
        }
    }

    pub fn stats(&self) -> Arc<SchedulerStats> {
        self.scheduler.stats()
    }

    /// Runs until a shutdown command arrives or both input queues close. Queued
    /// trigger events are processed before every session is stopped.
    pub async fn run(mut self) -> StatsSnapshot {
        let span = info_span!("scheduler loop");
        async move {
            info!(
                clips = self.scheduler.catalog().len(),
                max_sessions = self.scheduler.max_sessions(),
                "Scheduler started."
            );

            let mut triggers_open = true;
            let mut commands_open = true;
            while triggers_open || commands_open {
                let deadline = self.scheduler.next_deadline().map(Instant::from_std);

                tokio::select! {
                    event = self.triggers.recv(), if triggers_open => match event {
                        Some(event) => self.scheduler.handle_trigger(&event),
                        None => {
                            info!("Trigger source closed.");
                            triggers_open = false;
                        }
                    },
                    command = self.commands.recv(), if commands_open => match command {
                        Some(ManualCommand::Shutdown) => {
                            info!("Shutdown requested.");
                            break;
                        }
                        Some(command) => self.scheduler.handle_manual(&command),
                        None => {
                            info!("Manual command source closed.");
                            commands_open = false;
                        }
                    },
                    Some(event) = self.engine_events.recv() => {
                        self.scheduler.handle_engine_event(event);
                    },
                    _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                        self.scheduler.fire_due_timers();
                    },
                }
            }

            while let Ok(event) = self.triggers.try_recv() {
                self.scheduler.handle_trigger(&event);
            }
            self.scheduler.shutdown();

            let stats = self.scheduler.stats().snapshot();
            info!(stats = %stats, "Scheduler stopped.");
            stats
        }
        .instrument(span)
        .await
    }
}
