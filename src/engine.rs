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

//! The playback engine adapter: decoding and compositing live behind this trait.

use std::{error::Error, fmt, sync::Arc, time::Duration};

use crate::catalog::MediaReference;
use crate::scheduler::layout::Rect;

pub mod mock;

/// The raw identifier of an engine handle, as reported by engine callbacks.
pub type HandleId = u64;

/// A playback handle. Handles are move-only: destroying one consumes it, so it can
/// only ever be released once.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct EngineHandle {
    id: HandleId,
}

impl EngineHandle {
    pub fn new(id: HandleId) -> EngineHandle {
        EngineHandle { id }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }
}

impl fmt::Display for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle-{}", self.id)
    }
}

/// Errors reported by the playback engine. None of these are fatal to the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("unable to open {media}: {reason}")]
    Open {
        media: MediaReference,
        reason: String,
    },

    #[error("seek to {offset:?} failed: {reason}")]
    Seek { offset: Duration, reason: String },

    #[error("unable to release handle {handle}: {reason}")]
    Release { handle: HandleId, reason: String },

    #[error("unknown handle {0}")]
    UnknownHandle(HandleId),
}

/// Asynchronous notifications from the engine, delivered into the scheduler loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The handle reached the end of its media.
    EndOfStream(HandleId),
    /// The handle failed while playing.
    Error { handle: HandleId, message: String },
}

/// Called when a handle reaches the end of its media.
pub type EndOfStreamCallback = Box<dyn Fn(HandleId) + Send + Sync>;

/// Called when a handle fails while playing.
pub type ErrorCallback = Box<dyn Fn(HandleId, String) + Send + Sync>;

/// A decode/composite engine. Implementations must not block the caller: state
/// changes that take time are issued asynchronously and their outcome is reported
/// through the registered callbacks.
pub trait PlaybackEngine: fmt::Display + Send + Sync {
    /// Opens the media and starts playing it from the given offset.
    fn create(
        &self,
        media: &MediaReference,
        start_offset: Duration,
    ) -> Result<EngineHandle, EngineError>;

    /// Moves playback of the handle to the given offset.
    fn seek(&self, handle: &EngineHandle, offset: Duration) -> Result<(), EngineError>;

    /// Stops playback and releases every resource held by the handle.
    fn destroy(&self, handle: EngineHandle) -> Result<(), EngineError>;

    /// The current media position of the handle, if the engine knows it.
    fn query_position(&self, handle: &EngineHandle) -> Option<Duration>;

    /// Places the handle's output on the given region of the output surface.
    fn attach_to_compositor(&self, handle: &EngineHandle, rect: Rect) -> Result<(), EngineError>;

    /// Registers the end-of-stream callback, replacing any previous one.
    fn on_end_of_stream(&self, callback: EndOfStreamCallback);

    /// Registers the error callback, replacing any previous one.
    fn on_error(&self, callback: ErrorCallback);
}

/// Gets the playback engine with the given name.
pub fn get_engine(name: &str) -> Result<Arc<dyn PlaybackEngine>, Box<dyn Error>> {
    if name.starts_with("mock") {
        return Ok(Arc::new(mock::Engine::get(name)));
    }

    Err(format!("no playback engine named {}", name).into())
}

#[cfg(test)]
pub mod test {
    pub use super::mock::Engine;
}
