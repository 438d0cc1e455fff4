use std::f32::consts::TAU;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AnnotatorError, AnnotatorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StreamKind {
    Video,
    Audio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    pub kind: StreamKind,
    pub duration_secs: f64,
    /// Frames per second for video, chunks per second for audio.
    pub unit_rate: f64,
    pub sample_rate: Option<u32>,
    pub channels: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnitData {
    Frame {
        index: u64,
        width: u32,
        height: u32,
        rgb: Vec<u8>,
    },
    Audio {
        sample_rate: u32,
        channels: u16,
        /// Interleaved.
        samples: Vec<f32>,
    },
}

/// One decoded frame or audio chunk with its presentation time.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaUnit {
    pub time: f64,
    pub data: UnitData,
}

impl MediaUnit {
    pub fn frame_index(&self) -> Option<u64> {
        match self.data {
            UnitData::Frame { index, .. } => Some(index),
            UnitData::Audio { .. } => None,
        }
    }
}

/// Media decoding collaborator. Implementations are moved onto a decode thread.
pub trait MediaDecoder: Send {
    fn open(&mut self, path: &Path) -> AnnotatorResult<StreamInfo>;

    /// Reposition; returns the timestamp actually landed on.
    fn seek(&mut self, time: f64) -> AnnotatorResult<f64>;

    /// `Ok(None)` at end of stream.
    fn next_unit(&mut self) -> AnnotatorResult<Option<MediaUnit>>;
}

/// Decoder producing empty frames on a fixed frame clock. The path is ignored.
#[derive(Debug, Clone)]
pub struct SyntheticVideoDecoder {
    fps: f64,
    n_frames: u64,
    next: u64,
    opened: bool,
}

impl SyntheticVideoDecoder {
    pub fn new(fps: f64, n_frames: u64) -> Self {
        Self {
            fps,
            n_frames,
            next: 0,
            opened: false,
        }
    }
}

impl MediaDecoder for SyntheticVideoDecoder {
    fn open(&mut self, _path: &Path) -> AnnotatorResult<StreamInfo> {
        if self.fps <= 0.0 {
            return Err(AnnotatorError::Decode(format!("invalid frame rate {}", self.fps)));
        }
        self.opened = true;
        self.next = 0;
        Ok(StreamInfo {
            kind: StreamKind::Video,
            duration_secs: self.n_frames as f64 / self.fps,
            unit_rate: self.fps,
            sample_rate: None,
            channels: 0,
        })
    }

    fn seek(&mut self, time: f64) -> AnnotatorResult<f64> {
        let last = self.n_frames.saturating_sub(1);
        let frame = ((time.max(0.0) * self.fps).round() as u64).min(last);
        self.next = frame;
        Ok(frame as f64 / self.fps)
    }

    fn next_unit(&mut self) -> AnnotatorResult<Option<MediaUnit>> {
        if !self.opened {
            return Err(AnnotatorError::Decode("decoder not opened".into()));
        }
        if self.next >= self.n_frames {
            return Ok(None);
        }
        let index = self.next;
        self.next += 1;
        Ok(Some(MediaUnit {
            time: index as f64 / self.fps,
            data: UnitData::Frame {
                index,
                width: 0,
                height: 0,
                rgb: Vec::new(),
            },
        }))
    }
}

/// Mono sine tone decoder, chunked. The path is ignored.
#[derive(Debug, Clone)]
pub struct SyntheticAudioDecoder {
    sample_rate: u32,
    chunk: usize,
    total: u64,
    freq_hz: f32,
    next: u64,
}

impl SyntheticAudioDecoder {
    pub fn new(sample_rate: u32, duration_secs: f64, freq_hz: f32) -> Self {
        Self {
            sample_rate,
            chunk: (sample_rate as usize / 50).max(1),
            total: (duration_secs * f64::from(sample_rate)).round() as u64,
            freq_hz,
            next: 0,
        }
    }
}

impl MediaDecoder for SyntheticAudioDecoder {
    fn open(&mut self, _path: &Path) -> AnnotatorResult<StreamInfo> {
        self.next = 0;
        Ok(StreamInfo {
            kind: StreamKind::Audio,
            duration_secs: self.total as f64 / f64::from(self.sample_rate),
            unit_rate: f64::from(self.sample_rate) / self.chunk as f64,
            sample_rate: Some(self.sample_rate),
            channels: 1,
        })
    }

    fn seek(&mut self, time: f64) -> AnnotatorResult<f64> {
        let sample = ((time.max(0.0) * f64::from(self.sample_rate)) as u64).min(self.total);
        self.next = sample;
        Ok(sample as f64 / f64::from(self.sample_rate))
    }

    fn next_unit(&mut self) -> AnnotatorResult<Option<MediaUnit>> {
        if self.next >= self.total {
            return Ok(None);
        }
        let start = self.next;
        let end = (start + self.chunk as u64).min(self.total);
        let sr = self.sample_rate as f32;
        let samples = (start..end)
            .map(|i| (TAU * self.freq_hz * i as f32 / sr).sin() * 0.5)
            .collect();
        self.next = end;
        Ok(Some(MediaUnit {
            time: start as f64 / f64::from(self.sample_rate),
            data: UnitData::Audio {
                sample_rate: self.sample_rate,
                channels: 1,
                samples,
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn video_seek_quantizes_to_frames() {
        let mut decoder = SyntheticVideoDecoder::new(30.0, 90);
        decoder.open(Path::new("unused.mp4")).unwrap();
        let landed = decoder.seek(1.017).unwrap();
        assert!((landed - 1.0).abs() < 1e-9);
        let unit = decoder.next_unit().unwrap().unwrap();
        assert_eq!(unit.frame_index(), Some(30));
    }

    #[test]
    fn audio_stream_ends() {
        let mut decoder = SyntheticAudioDecoder::new(1000, 0.05, 100.0);
        let info = decoder.open(Path::new("unused.wav")).unwrap();
        assert_eq!(info.sample_rate, Some(1000));
        let mut total = 0;
        while let Some(unit) = decoder.next_unit().unwrap() {
            if let UnitData::Audio { samples, .. } = unit.data {
                total += samples.len();
            }
        }
        assert_eq!(total, 50);
    }
}
