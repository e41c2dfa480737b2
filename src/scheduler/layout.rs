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

//! Screen geometry for the active sessions.

use std::fmt;

use serde::Deserialize;

/// The largest session count with a defined layout.
pub const MAX_LAYOUT_SLOTS: usize = 4;

/// The output surface.
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Canvas {
    width: u32,
    height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Canvas {
        Canvas { width, height }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Canvas::new(1920, 1080)
    }
}

impl fmt::Display for Canvas {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A region of the canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Rect {
        Rect {
            x,
            y,
            width,
            height,
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}+{}+{}", self.width, self.height, self.x, self.y)
    }
}

/// Computes the rectangles for `count` sessions, in slot order. Counts without an
/// enumerated layout, including zero, produce no slots.
pub fn layout(canvas: Canvas, count: usize) -> Vec<Rect> {
    let (width, height) = (canvas.width, canvas.height);
    let half_width = width / 2;
    let half_height = height / 2;

    match count {
        1 => vec![Rect::new(0, 0, width, height)],
        2 => vec![
            Rect::new(0, 0, half_width, height),
            Rect::new(half_width, 0, half_width, height),
        ],
        3 => vec![
            Rect::new(0, 0, half_width, height),
            Rect::new(half_width, 0, half_width, half_height),
            Rect::new(half_width, half_height, half_width, half_height),
        ],
        4 => vec![
            Rect::new(0, 0, half_width, half_height),
            Rect::new(half_width, 0, half_width, half_height),
            Rect::new(0, half_height, half_width, half_height),
            Rect::new(half_width, half_height, half_width, half_height),
        ],
        _ => Vec::new(),
    }
}
