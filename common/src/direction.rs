use serde::Deserialize;
use std::fmt;

use crate::geometry::BoundingBox;

/// Where the camera should pan to bring the target back toward the middle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    UpLeft,
    DownLeft,
    UpRight,
    DownRight,
    Left,
    Right,
    Up,
    Down,
    /// Target is inside the central area; no move needed.
    Center,
}

impl Direction {
    /// Printed label. `Center` is the empty string.
    pub fn label(self) -> &'static str {
        match self {
            Direction::UpLeft => "UpLeft",
            Direction::DownLeft => "DownLeft",
            Direction::UpRight => "UpRight",
            Direction::DownRight => "DownRight",
            Direction::Left => "Left",
            Direction::Right => "Right",
            Direction::Up => "Up",
            Direction::Down => "Down",
            Direction::Center => "",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which frame dimension the DownLeft check measures its bottom margin from.
///
/// The historical behavior compares the center's y coordinate against
/// `frame_width - margin_h`, so on non-square frames the DownLeft band is
/// shifted relative to DownRight and Down. `Width` keeps that behavior;
/// `Height` uses the frame height like every other bottom check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownLeftAxis {
    #[default]
    Width,
    Height,
}

/// Maps a target's center to one of nine zones using proportional margins.
#[derive(Debug, Clone, Copy)]
pub struct Classifier {
    limit_perc: f64,
    down_left_axis: DownLeftAxis,
}

impl Classifier {
    /// `limit_perc` is expected in (0, 0.5]; config validation enforces it.
    pub fn new(limit_perc: f64, down_left_axis: DownLeftAxis) -> Self {
        Self {
            limit_perc,
            down_left_axis,
        }
    }

    pub fn classify(&self, target: &BoundingBox, screen_w: u32, screen_h: u32) -> Direction {
        self.classify_center(target.center(), screen_w as f64, screen_h as f64)
    }

    /// Corners are checked before edges; the first match wins. All bounds are
    /// inclusive.
    pub fn classify_center(&self, center: (f64, f64), screen_w: f64, screen_h: f64) -> Direction {
        let (x, y) = center;
        let margin_w = screen_w * self.limit_perc;
        let margin_h = screen_h * self.limit_perc;

        let left = x <= margin_w;
        let right = x >= screen_w - margin_w;
        let top = y <= margin_h;
        let bottom = y >= screen_h - margin_h;
        let down_left_bottom = match self.down_left_axis {
            DownLeftAxis::Width => y >= screen_w - margin_h,
            DownLeftAxis::Height => bottom,
        };

        if left && top {
            Direction::UpLeft
        } else if left && down_left_bottom {
            Direction::DownLeft
        } else if right && top {
            Direction::UpRight
        } else if right && bottom {
            Direction::DownRight
        } else if left {
            Direction::Left
        } else if right {
            Direction::Right
        } else if top {
            Direction::Up
        } else if bottom {
            Direction::Down
        } else {
            Direction::Center
        }
    }
}

/// Classify an object given its top-left corner and size, with the
/// historical DownLeft behavior.
pub fn camera_move(
    corner: (f64, f64),
    obj_w: f64,
    obj_h: f64,
    screen_w: f64,
    screen_h: f64,
    limit_perc: f64,
) -> Direction {
    let center = (corner.0 + obj_w / 2.0, corner.1 + obj_h / 2.0);
    Classifier::new(limit_perc, DownLeftAxis::Width).classify_center(center, screen_w, screen_h)
}
