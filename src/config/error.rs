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
use std::path::PathBuf;

/// Typed error for config load/parse failures. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config load/parse error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("clip '{clip}' references media that does not exist: {}", path.display())]
    MissingMedia { clip: String, path: PathBuf },

    #[error("unable to resolve {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid note '{0}'")]
    InvalidNote(String),

    #[error("invalid MIDI channel {0}, expected 1-16, -1 or \"any\"")]
    InvalidChannel(String),

    #[error("invalid duration '{value}': {reason}")]
    InvalidDuration { value: String, reason: String },

    #[error("clip '{clip}' is invalid: {reason}")]
    InvalidClip { clip: String, reason: String },

    #[error("more than one clip resolves to the same identity as '{0}'")]
    DuplicateClip(String),

    #[error("debug trigger '{0}' is bound to more than one clip")]
    DuplicateDebugTrigger(String),

    #[error("max_concurrent_sessions must be between 1 and {max}, got {got}")]
    InvalidCapacity { got: usize, max: usize },

    #[error("trigger_queue_capacity must be greater than zero")]
    InvalidQueueCapacity,
}
