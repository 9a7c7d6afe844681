use crate::{DecodingError, ExecutionState};
use std::fmt;

/// Colour token handed to render surfaces. Only produced by [`color_for`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DisplayColor(&'static str);

pub const RUNNING: DisplayColor = DisplayColor("#dffbe3");
pub const UP_FOR_RETRY: DisplayColor = DisplayColor("#ffc620");
pub const SUCCESSFUL: DisplayColor = DisplayColor("#39c84e");
pub const SKIPPED: DisplayColor = DisplayColor("#abbefb");
pub const FAILED: DisplayColor = DisplayColor("#ff4020");
pub const NOT_STARTED: DisplayColor = DisplayColor("white");

impl DisplayColor {
    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Resolves the token to an RGB triple for backends without CSS colours.
    pub fn rgb(&self) -> Option<(u8, u8, u8)> {
        match self.0 {
            "white" => Some((255, 255, 255)),
            hex => {
                let digits = hex.strip_prefix('#')?;
                if digits.len() != 6 {
                    return None;
                }
                let channel = |idx: usize| u8::from_str_radix(digits.get(idx..idx + 2)?, 16).ok();
                Some((channel(0)?, channel(2)?, channel(4)?))
            }
        }
    }
}

impl fmt::Display for DisplayColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

pub fn color_for(state: ExecutionState) -> DisplayColor {
    match state {
        ExecutionState::Running => RUNNING,
        ExecutionState::UpForRetry => UP_FOR_RETRY,
        ExecutionState::Successful => SUCCESSFUL,
        ExecutionState::Skipped => SKIPPED,
        ExecutionState::Failed => FAILED,
        ExecutionState::NotStarted => NOT_STARTED,
    }
}

pub fn color_for_raw(raw: &str) -> Result<DisplayColor, DecodingError> {
    Ok(color_for(raw.parse()?))
}
