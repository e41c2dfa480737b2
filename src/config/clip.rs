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
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;
use tracing::debug;

use super::error::ConfigError;
use crate::catalog::{Catalog, Clip, MediaReference, MidiChannel};

/// A YAML/JSON representation of the clip catalog.
#[derive(Deserialize, Clone)]
pub struct ClipCatalog {
    /// The clips, in the order they should be listed.
    clips: Vec<ClipDefinition>,
}

impl ClipCatalog {
    /// Parses a clip catalog from a YAML or JSON file.
    pub fn deserialize(path: &Path) -> Result<ClipCatalog, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<ClipCatalog>()?)
    }

    /// Loads the catalog file and resolves every clip into the runtime catalog.
    /// Media paths are resolved relative to the catalog file.
    pub fn load(path: &Path) -> Result<Catalog, ConfigError> {
        let base_path = path.parent().unwrap_or_else(|| Path::new("."));
        ClipCatalog::deserialize(path)?.to_catalog(base_path)
    }

    /// Converts the definitions into the runtime catalog.
    pub fn to_catalog(&self, base_path: &Path) -> Result<Catalog, ConfigError> {
        let clips = self
            .clips
            .iter()
            .map(|clip| clip.to_clip(base_path))
            .collect::<Result<Vec<Clip>, ConfigError>>()?;
        Catalog::new(clips)
    }

    pub fn clips(&self) -> &[ClipDefinition] {
        &self.clips
    }
}

/// A note, written either as a MIDI note number or as a name like "C#3".
#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum NoteDefinition {
    Number(i64),
    Name(String),
}

impl NoteDefinition {
    /// Resolves the note. A number of -1 means "no note".
    fn resolve(&self) -> Result<Option<u8>, ConfigError> {
        match self {
            NoteDefinition::Number(-1) => Ok(None),
            NoteDefinition::Number(n) => u8::try_from(*n)
                .ok()
                .filter(|n| *n <= 127)
                .map(Some)
                .ok_or_else(|| ConfigError::InvalidNote(n.to_string())),
            NoteDefinition::Name(name) => note_from_name(name).map(Some),
        }
    }
}

/// The channel a clip listens on, written 1-based, as -1 or as "any".
#[derive(Deserialize, Clone, Debug)]
#[serde(untagged)]
pub enum ChannelDefinition {
    Number(i64),
    Name(String),
}

impl ChannelDefinition {
    fn resolve(&self) -> Result<MidiChannel, ConfigError> {
        match self {
            ChannelDefinition::Number(-1) => Ok(MidiChannel::Any),
            ChannelDefinition::Number(n) if (1..=16).contains(n) => {
                Ok(MidiChannel::Channel((*n - 1) as u8))
            }
            ChannelDefinition::Number(n) => Err(ConfigError::InvalidChannel(n.to_string())),
            ChannelDefinition::Name(name) if name.eq_ignore_ascii_case("any") => {
                Ok(MidiChannel::Any)
            }
            ChannelDefinition::Name(name) => Err(ConfigError::InvalidChannel(name.clone())),
        }
    }
}

/// A YAML/JSON representation of a single clip.
#[derive(Deserialize, Clone)]
pub struct ClipDefinition {
    /// The display name of the clip.
    name: String,

    /// The media file, absolute or relative to the catalog file.
    file_path: String,

    /// Where playback of the segment starts, in seconds.
    #[serde(default)]
    start_sec: f64,

    /// Where the segment ends, in seconds. Absent or negative plays to the natural end.
    end_sec: Option<f64>,

    /// The MIDI channel. Absent means any channel.
    midi_channel: Option<ChannelDefinition>,

    /// A single trigger note.
    midi_note: Option<NoteDefinition>,

    /// The chord that must be held for the clip to play.
    #[serde(default)]
    required_notes: Vec<NoteDefinition>,

    /// Re-triggering while already playing does nothing.
    #[serde(default)]
    exclusive: bool,

    /// Always play from the start of the segment instead of resuming.
    #[serde(default)]
    restart_on_play: bool,

    /// Hard restart the clip on this period, e.g. "4s".
    loop_period: Option<String>,

    /// Hard restart period in milliseconds.
    loop_duration_ms: Option<u64>,

    /// The manual trigger for this clip.
    #[serde(alias = "debug_keypress")]
    debug_trigger: Option<String>,
}

impl ClipDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves the definition into a clip. The media file must exist.
    pub fn to_clip(&self, base_path: &Path) -> Result<Clip, ConfigError> {
        let media_reference = self.media_reference(base_path)?;
        let (start_offset, end_offset) = self.segment()?;

        let mut required_notes = BTreeSet::new();
        if let Some(note) = &self.midi_note {
            required_notes.extend(note.resolve()?);
        }
        for note in &self.required_notes {
            required_notes.extend(note.resolve()?);
        }

        let midi_channel = match &self.midi_channel {
            Some(channel) => channel.resolve()?,
            None => MidiChannel::Any,
        };

        let clip = Clip::new(&self.name, media_reference)
            .with_segment(start_offset, end_offset)
            .with_channel(midi_channel)
            .with_required_notes(required_notes)
            .with_exclusive(self.exclusive)
            .with_restart_on_play(self.restart_on_play)
            .with_loop_period(self.loop_period()?)
            .with_debug_trigger(self.debug_trigger.clone());

        debug!(clip = %clip, "Clip resolved");
        Ok(clip)
    }

    fn media_reference(&self, base_path: &Path) -> Result<MediaReference, ConfigError> {
        let path = PathBuf::from(&self.file_path);
        let path = if path.is_absolute() {
            path
        } else {
            base_path.join(path)
        };

        if !path.exists() {
            return Err(ConfigError::MissingMedia {
                clip: self.name.clone(),
                path,
            });
        }

        let canonical = path
            .canonicalize()
            .map_err(|source| ConfigError::Io { path, source })?;
        Ok(MediaReference::new(format!("file://{}", canonical.display())))
    }

    fn segment(&self) -> Result<(Duration, Option<Duration>), ConfigError> {
        let start_offset = Duration::try_from_secs_f64(self.start_sec).map_err(|_| {
            ConfigError::InvalidClip {
                clip: self.name.clone(),
                reason: format!("start_sec {} must be a non-negative number", self.start_sec),
            }
        })?;

        let end_offset = match self.end_sec {
            Some(end_sec) if end_sec >= 0.0 => {
                let end_offset =
                    Duration::try_from_secs_f64(end_sec).map_err(|_| ConfigError::InvalidClip {
                        clip: self.name.clone(),
                        reason: format!("end_sec {} is not a valid time", end_sec),
                    })?;
                if end_offset <= start_offset {
                    return Err(ConfigError::InvalidClip {
                        clip: self.name.clone(),
                        reason: format!(
                            "end_sec {} must be after start_sec {}",
                            end_sec, self.start_sec
                        ),
                    });
                }
                Some(end_offset)
            }
            _ => None,
        };

        Ok((start_offset, end_offset))
    }

    fn loop_period(&self) -> Result<Option<Duration>, ConfigError> {
        let period = match (&self.loop_period, self.loop_duration_ms) {
            (Some(period), _) => Some(parse_duration(period)?),
            (None, Some(ms)) => Some(Duration::from_millis(ms)),
            (None, None) => None,
        };
        Ok(period.filter(|period| !period.is_zero()))
    }
}

/// Parses a human readable duration such as "250ms" or "4s".
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    DurationString::from_string(value.to_string())
        .map(Duration::from)
        .map_err(|e| ConfigError::InvalidDuration {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Converts a note name such as "C3", "F#4" or "Bb-1" to a MIDI note number.
/// Middle C is C3 (60).
pub fn note_from_name(name: &str) -> Result<u8, ConfigError> {
    let invalid = || ConfigError::InvalidNote(name.to_string());
    let trimmed = name.trim();

    let mut chars = trimmed.chars();
    let letter = chars.next().ok_or_else(invalid)?;
    let pitch_class: i32 = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return Err(invalid()),
    };

    let rest = chars.as_str();
    let (accidental, octave) = if let Some(octave) = rest.strip_prefix('#') {
        (1, octave)
    } else if let Some(octave) = rest.strip_prefix('b') {
        (-1, octave)
    } else {
        (0, rest)
    };

    let octave: i32 = octave.parse().map_err(|_| invalid())?;
    let note = (octave + 2) * 12 + pitch_class + accidental;
    u8::try_from(note)
        .ok()
        .filter(|note| *note <= 127)
        .ok_or_else(invalid)
}
