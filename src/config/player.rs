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
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File};
use serde::Deserialize;

use super::clip::parse_duration;
use super::error::ConfigError;
use crate::scheduler::layout::{Canvas, MAX_LAYOUT_SLOTS};

/// Default number of clips that may play at once.
pub const DEFAULT_MAX_CONCURRENT_SESSIONS: usize = 4;

/// Default interval for checking whether a segment has reached its end.
const DEFAULT_POSITION_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default size of the queue between the trigger source and the scheduler.
const DEFAULT_TRIGGER_QUEUE_CAPACITY: usize = 256;

/// The configuration for the installation.
#[derive(Deserialize, Clone)]
pub struct Player {
    /// The path to the clip catalog, relative to this file.
    clips: String,

    /// The MIDI input device to listen to.
    midi_device: Option<String>,

    /// The playback engine to use.
    #[serde(default = "default_engine")]
    engine: String,

    /// The maximum number of clips that can play at the same time.
    #[serde(default = "default_max_concurrent_sessions")]
    max_concurrent_sessions: usize,

    /// The output surface.
    #[serde(default)]
    canvas: Canvas,

    /// How often to check segment positions, e.g. "100ms".
    position_poll_interval: Option<String>,

    /// The size of the trigger event queue.
    #[serde(default = "default_trigger_queue_capacity")]
    trigger_queue_capacity: usize,

    /// Whether to accept manual triggers from the keyboard.
    #[serde(default)]
    keyboard: bool,
}

fn default_engine() -> String {
    String::from("mock")
}

fn default_max_concurrent_sessions() -> usize {
    DEFAULT_MAX_CONCURRENT_SESSIONS
}

fn default_trigger_queue_capacity() -> usize {
    DEFAULT_TRIGGER_QUEUE_CAPACITY
}

impl Player {
    /// Creates a new player configuration.
    pub fn new(clips: &str, midi_device: Option<&str>, max_concurrent_sessions: usize) -> Player {
        Player {
            clips: clips.to_string(),
            midi_device: midi_device.map(|device| device.to_string()),
            engine: default_engine(),
            max_concurrent_sessions,
            canvas: Canvas::default(),
            position_poll_interval: None,
            trigger_queue_capacity: DEFAULT_TRIGGER_QUEUE_CAPACITY,
            keyboard: false,
        }
    }

    /// Parses and validates a player configuration from a YAML or JSON file.
    pub fn deserialize(path: &Path) -> Result<Player, ConfigError> {
        let player = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Player>()?;
        player.validate()?;
        Ok(player)
    }

    /// Checks the limits the scheduler depends on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_sessions == 0 || self.max_concurrent_sessions > MAX_LAYOUT_SLOTS {
            return Err(ConfigError::InvalidCapacity {
                got: self.max_concurrent_sessions,
                max: MAX_LAYOUT_SLOTS,
            });
        }
        if self.trigger_queue_capacity == 0 {
            return Err(ConfigError::InvalidQueueCapacity);
        }
        self.position_poll_interval()?;
        Ok(())
    }

    /// The clip catalog path, resolved against the directory of the player config.
    pub fn clips_path(&self, player_path: &Path) -> PathBuf {
        let clips = PathBuf::from(&self.clips);
        if clips.is_absolute() {
            return clips;
        }
        match player_path.parent() {
            Some(parent) => parent.join(clips),
            None => clips,
        }
    }

    pub fn midi_device(&self) -> Option<&str> {
        self.midi_device.as_deref()
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn max_concurrent_sessions(&self) -> usize {
        self.max_concurrent_sessions
    }

    pub fn canvas(&self) -> Canvas {
        self.canvas
    }

    pub fn position_poll_interval(&self) -> Result<Duration, ConfigError> {
        match &self.position_poll_interval {
            Some(interval) => parse_duration(interval),
            None => Ok(DEFAULT_POSITION_POLL_INTERVAL),
        }
    }

    pub fn trigger_queue_capacity(&self) -> usize {
        self.trigger_queue_capacity
    }

    pub fn keyboard(&self) -> bool {
        self.keyboard
    }
}
