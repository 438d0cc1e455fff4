use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AnnotatorError;

/// Which media driver owns the shared clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncMode {
    /// Video playback moves the cursor; the plot follows.
    #[default]
    VideoDrivesPlot,
    /// Plot interaction moves the cursor and seeks the video.
    PlotDrivesVideo,
    /// A streaming decoder advances the cursor.
    StreamDrivesPlot,
}

/// Driver slots held by `TimeSync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DriverSlot {
    Video,
    Stream,
}

impl SyncMode {
    pub const ALL: [SyncMode; 3] = [
        SyncMode::VideoDrivesPlot,
        SyncMode::PlotDrivesVideo,
        SyncMode::StreamDrivesPlot,
    ];

    pub fn authoritative_slot(self) -> DriverSlot {
        match self {
            SyncMode::VideoDrivesPlot | SyncMode::PlotDrivesVideo => DriverSlot::Video,
            SyncMode::StreamDrivesPlot => DriverSlot::Stream,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::VideoDrivesPlot => "videoDrivesPlot",
            SyncMode::PlotDrivesVideo => "plotDrivesVideo",
            SyncMode::StreamDrivesPlot => "streamDrivesPlot",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncMode {
    type Err = AnnotatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SyncMode::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| AnnotatorError::validation(format!("unknown sync mode '{s}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_its_own_names() {
        for mode in SyncMode::ALL {
            assert_eq!(mode.as_str().parse::<SyncMode>().unwrap(), mode);
        }
        assert!("napari".parse::<SyncMode>().is_err());
    }
}
