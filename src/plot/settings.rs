use serde::{Deserialize, Serialize};

use crate::error::{AnnotatorError, AnnotatorResult};
use crate::media::ComputeParams;

/// Display settings shared by the line plot and the spectrogram.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PlotSettings {
    /// Width of the visible time window.
    pub window_secs: f64,
    pub ymin: Option<f64>,
    pub ymax: Option<f64>,
    pub show_spectrogram: bool,
    pub nfft: u32,
    /// Hop as a fraction of `nfft`.
    pub hop_frac: f64,
    pub vmin_db: f32,
    pub vmax_db: f32,
    /// Spectrogram is requested for this many visible windows around the view.
    pub buffer_multiplier: f64,
}

impl Default for PlotSettings {
    fn default() -> Self {
        Self {
            window_secs: 10.0,
            ymin: None,
            ymax: None,
            show_spectrogram: false,
            nfft: 1024,
            hop_frac: 0.5,
            vmin_db: -120.0,
            vmax_db: 20.0,
            buffer_multiplier: 5.0,
        }
    }
}

impl PlotSettings {
    pub fn validate(&self) -> AnnotatorResult<()> {
        if !(self.window_secs.is_finite() && self.window_secs > 0.0) {
            return Err(AnnotatorError::validation("plot window must be positive"));
        }
        if let (Some(lo), Some(hi)) = (self.ymin, self.ymax) {
            if lo >= hi {
                return Err(AnnotatorError::validation("ymin must be below ymax"));
            }
        }
        if self.nfft < 8 {
            return Err(AnnotatorError::validation("nfft must be >= 8"));
        }
        if !(self.hop_frac > 0.0 && self.hop_frac <= 1.0) {
            return Err(AnnotatorError::validation("hop_frac must be in (0, 1]"));
        }
        if self.vmin_db >= self.vmax_db {
            return Err(AnnotatorError::validation("vmin must be below vmax"));
        }
        if self.buffer_multiplier < 1.0 {
            return Err(AnnotatorError::validation("buffer multiplier must be >= 1"));
        }
        Ok(())
    }

    pub fn hop(&self) -> u32 {
        ((self.hop_frac * f64::from(self.nfft)).round() as u32).max(1)
    }

    pub fn spectrogram_params(&self, sample_rate: u32) -> ComputeParams {
        ComputeParams::spectrogram(sample_rate, self.nfft, self.hop())
    }

    /// Map a dB value onto 0..1 for colouring.
    pub fn normalize_db(&self, db: f32) -> f32 {
        ((db - self.vmin_db) / (self.vmax_db - self.vmin_db)).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = PlotSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.hop(), 512);
    }

    #[test]
    fn rejects_inverted_limits() {
        let settings = PlotSettings {
            ymin: Some(3.0),
            ymax: Some(1.0),
            ..PlotSettings::default()
        };
        assert!(settings.validate().unwrap_err().is_validation());
    }
}
