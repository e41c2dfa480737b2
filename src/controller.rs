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

//! Manual trigger surfaces.

use std::{io, thread::JoinHandle};

use tokio::sync::mpsc::Sender;

use crate::trigger::ManualCommand;

pub mod keyboard;

/// A source of manual commands. Drivers run on their own thread so a blocked read
/// never holds up the scheduler or runtime shutdown.
pub trait Driver: Send + Sync + 'static {
    fn monitor_events(&self, commands_tx: Sender<ManualCommand>) -> JoinHandle<Result<(), io::Error>>;
}
