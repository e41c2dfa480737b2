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
    collections::{BTreeMap, HashSet},
    fmt,
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use super::{EndOfStreamCallback, EngineError, EngineHandle, ErrorCallback, HandleId};
use crate::catalog::MediaReference;
use crate::scheduler::layout::Rect;

/// A single simulated playback.
struct Playback {
    media: MediaReference,
    /// The media offset at `since`.
    offset: Duration,
    since: Instant,
    rect: Option<Rect>,
    /// A fixed position reported instead of the simulated one.
    position: Option<Duration>,
}

#[derive(Default)]
struct State {
    next_id: HandleId,
    live: BTreeMap<HandleId, Playback>,
    created: Vec<(MediaReference, Duration)>,
    destroyed: Vec<HandleId>,
    seeks: Vec<(HandleId, Duration)>,
    failing_media: HashSet<MediaReference>,
    fail_seek: bool,
    fail_destroy: bool,
}

/// A mock engine. Doesn't decode anything, but tracks simulated playback positions
/// so the scheduler can run against it end to end.
#[derive(Clone)]
pub struct Engine {
    name: String,
    state: Arc<Mutex<State>>,
    end_of_stream: Arc<RwLock<Option<EndOfStreamCallback>>>,
    error: Arc<RwLock<Option<ErrorCallback>>>,
}

impl Engine {
    /// Gets the given mock engine.
    pub fn get(name: &str) -> Engine {
        Engine {
            name: name.to_string(),
            state: Arc::new(Mutex::new(State {
                next_id: 1,
                ..Default::default()
            })),
            end_of_stream: Arc::new(RwLock::new(None)),
            error: Arc::new(RwLock::new(None)),
        }
    }

    #[cfg(test)]
    /// The number of handles that have been created and not released.
    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    #[cfg(test)]
    /// The ids of the live handles, in creation order.
    pub fn live_handles(&self) -> Vec<HandleId> {
        self.state.lock().live.keys().copied().collect()
    }

    #[cfg(test)]
    /// Every create call that succeeded, with its start offset.
    pub fn created(&self) -> Vec<(MediaReference, Duration)> {
        self.state.lock().created.clone()
    }

    #[cfg(test)]
    /// The ids of every released handle.
    pub fn destroyed(&self) -> Vec<HandleId> {
        self.state.lock().destroyed.clone()
    }

    #[cfg(test)]
    /// Every successful seek.
    pub fn seeks(&self) -> Vec<(HandleId, Duration)> {
        self.state.lock().seeks.clone()
    }

    #[cfg(test)]
    /// The compositor region of the handle.
    pub fn rect(&self, handle: HandleId) -> Option<Rect> {
        self.state
            .lock()
            .live
            .get(&handle)
            .and_then(|playback| playback.rect)
    }

    #[cfg(test)]
    /// Makes create fail for the given media.
    pub fn fail_create(&self, media: &MediaReference) {
        self.state.lock().failing_media.insert(media.clone());
    }

    #[cfg(test)]
    /// Makes every seek fail.
    pub fn fail_seek(&self, fail: bool) {
        self.state.lock().fail_seek = fail;
    }

    #[cfg(test)]
    /// Makes every destroy fail. The handle is leaked.
    pub fn fail_destroy(&self, fail: bool) {
        self.state.lock().fail_destroy = fail;
    }

    #[cfg(test)]
    /// Pins the position reported for the handle.
    pub fn set_position(&self, handle: HandleId, position: Duration) {
        if let Some(playback) = self.state.lock().live.get_mut(&handle) {
            playback.position = Some(position);
        }
    }

    #[cfg(test)]
    /// Fires the end-of-stream callback for the handle.
    pub fn mock_end_of_stream(&self, handle: HandleId) {
        if let Some(callback) = self.end_of_stream.read().as_ref() {
            callback(handle);
        }
    }

    #[cfg(test)]
    /// Fires the error callback for the handle.
    pub fn mock_error(&self, handle: HandleId, message: &str) {
        if let Some(callback) = self.error.read().as_ref() {
            callback(handle, message.to_string());
        }
    }
}

impl super::PlaybackEngine for Engine {
    fn create(
        &self,
        media: &MediaReference,
        start_offset: Duration,
    ) -> Result<EngineHandle, EngineError> {
        let mut state = self.state.lock();
        if state.failing_media.contains(media) {
            return Err(EngineError::Open {
                media: media.clone(),
                reason: String::from("mock failure"),
            });
        }

        let id = state.next_id;
        state.next_id += 1;
        state.live.insert(
            id,
            Playback {
                media: media.clone(),
                offset: start_offset,
                since: Instant::now(),
                rect: None,
                position: None,
            },
        );
        state.created.push((media.clone(), start_offset));

        info!(
            engine = self.name,
            handle = id,
            media = %media,
            offset = ?start_offset,
            "Playing media (mock)."
        );
        Ok(EngineHandle::new(id))
    }

    fn seek(&self, handle: &EngineHandle, offset: Duration) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.fail_seek {
            return Err(EngineError::Seek {
                offset,
                reason: String::from("mock failure"),
            });
        }

        let playback = state
            .live
            .get_mut(&handle.id())
            .ok_or(EngineError::UnknownHandle(handle.id()))?;
        playback.offset = offset;
        playback.since = Instant::now();
        playback.position = None;
        state.seeks.push((handle.id(), offset));

        debug!(handle = handle.id(), offset = ?offset, "Seek (mock).");
        Ok(())
    }

    fn destroy(&self, handle: EngineHandle) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.fail_destroy {
            return Err(EngineError::Release {
                handle: handle.id(),
                reason: String::from("mock failure"),
            });
        }

        let playback = state
            .live
            .remove(&handle.id())
            .ok_or(EngineError::UnknownHandle(handle.id()))?;
        state.destroyed.push(handle.id());

        info!(
            engine = self.name,
            handle = handle.id(),
            media = %playback.media,
            rect = ?playback.rect,
            "Stopped media (mock)."
        );
        Ok(())
    }

    fn query_position(&self, handle: &EngineHandle) -> Option<Duration> {
        self.state.lock().live.get(&handle.id()).map(|playback| {
            playback
                .position
                .unwrap_or_else(|| playback.offset + playback.since.elapsed())
        })
    }

    fn attach_to_compositor(&self, handle: &EngineHandle, rect: Rect) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        let playback = state
            .live
            .get_mut(&handle.id())
            .ok_or(EngineError::UnknownHandle(handle.id()))?;
        playback.rect = Some(rect);

        debug!(handle = handle.id(), rect = %rect, "Attached to compositor (mock).");
        Ok(())
    }

    fn on_end_of_stream(&self, callback: EndOfStreamCallback) {
        *self.end_of_stream.write() = Some(callback);
    }

    fn on_error(&self, callback: ErrorCallback) {
        *self.error.write() = Some(callback);
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
