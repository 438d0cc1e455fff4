use std::path::Path;

use super::driver::MediaDriver;
use crate::error::{AnnotatorError, AnnotatorResult};
use crate::media::{DecodedUnit, MediaDecoder, MediaUnit, StreamInfo};

/// Decodes the whole stream on open and serves it from memory. Seeks are
/// synchronous and land on the nearest decoded unit.
pub struct BufferedDriver {
    decoder: Box<dyn MediaDecoder>,
    units: Vec<MediaUnit>,
    position: usize,
    landing: Option<usize>,
    current_time: f64,
    playing: bool,
}

impl BufferedDriver {
    pub fn new(decoder: Box<dyn MediaDecoder>) -> Self {
        Self {
            decoder,
            units: Vec::new(),
            position: 0,
            landing: None,
            current_time: 0.0,
            playing: false,
        }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    fn nearest(&self, time: f64) -> Option<usize> {
        if self.units.is_empty() {
            return None;
        }
        let after = self.units.partition_point(|u| u.time < time);
        if after == 0 {
            return Some(0);
        }
        if after >= self.units.len() {
            return Some(self.units.len() - 1);
        }
        let before = after - 1;
        if time - self.units[before].time <= self.units[after].time - time {
            Some(before)
        } else {
            Some(after)
        }
    }
}

impl MediaDriver for BufferedDriver {
    fn open(&mut self, path: &Path) -> AnnotatorResult<StreamInfo> {
        let info = self.decoder.open(path)?;
        let mut units = Vec::new();
        while let Some(unit) = self.decoder.next_unit()? {
            units.push(unit);
        }
        self.units = units;
        self.position = 0;
        self.landing = None;
        self.current_time = 0.0;
        self.playing = false;
        Ok(info)
    }

    fn seek(&mut self, time: f64) -> AnnotatorResult<()> {
        let idx = self
            .nearest(time)
            .ok_or_else(|| AnnotatorError::Decode("seek on an empty stream".to_string()))?;
        self.landing = Some(idx);
        self.position = idx;
        self.current_time = self.units[idx].time;
        Ok(())
    }

    fn next_unit(&mut self) -> AnnotatorResult<Option<DecodedUnit>> {
        if let Some(idx) = self.landing.take() {
            self.position = idx + 1;
            self.current_time = self.units[idx].time;
            return Ok(Some(DecodedUnit {
                unit: self.units[idx].clone(),
                after_seek: true,
            }));
        }
        if !self.playing {
            return Ok(None);
        }
        match self.units.get(self.position) {
            Some(unit) => {
                self.position += 1;
                self.current_time = unit.time;
                Ok(Some(DecodedUnit {
                    unit: unit.clone(),
                    after_seek: false,
                }))
            }
            None => {
                self.playing = false;
                Ok(None)
            }
        }
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn play(&mut self) -> AnnotatorResult<()> {
        if self.units.is_empty() {
            return Err(AnnotatorError::Decode("nothing to play".to_string()));
        }
        self.playing = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::SyntheticVideoDecoder;

    fn driver() -> BufferedDriver {
        let mut driver = BufferedDriver::new(Box::new(SyntheticVideoDecoder::new(10.0, 50)));
        driver.open(Path::new("trial.mp4")).unwrap();
        driver
    }

    #[test]
    fn seek_lands_on_nearest_frame() {
        let mut driver = driver();
        driver.seek(2.04).unwrap();
        let landed = driver.next_unit().unwrap().unwrap();
        assert!(landed.after_seek);
        assert_eq!(landed.unit.frame_index(), Some(20));
        assert!(driver.next_unit().unwrap().is_none());
    }

    #[test]
    fn playing_advances_one_frame_per_call() {
        let mut driver = driver();
        driver.seek(4.8).unwrap();
        driver.play().unwrap();
        let frames: Vec<u64> = std::iter::from_fn(|| driver.next_unit().unwrap())
            .filter_map(|u| u.unit.frame_index())
            .collect();
        assert_eq!(frames, vec![48, 49]);
        assert!(!driver.is_playing());
    }
}
