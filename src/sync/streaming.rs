use std::path::Path;

use super::driver::MediaDriver;
use crate::error::{AnnotatorError, AnnotatorResult};
use crate::media::{DecodeWorker, DecodedUnit, MediaDecoder, StreamInfo, WorkerPoll};

/// Decodes on a background worker through a bounded queue.
pub struct StreamingDriver {
    name: String,
    decoder: Option<Box<dyn MediaDecoder>>,
    capacity: usize,
    worker: Option<DecodeWorker>,
    awaiting_landing: bool,
    current_time: f64,
    playing: bool,
}

impl StreamingDriver {
    pub fn new(decoder: Box<dyn MediaDecoder>, capacity: usize) -> Self {
        Self {
            name: "stream".to_string(),
            decoder: Some(decoder),
            capacity,
            worker: None,
            awaiting_landing: false,
            current_time: 0.0,
            playing: false,
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    fn worker(&mut self) -> AnnotatorResult<&mut DecodeWorker> {
        self.worker
            .as_mut()
            .ok_or_else(|| AnnotatorError::Decode(format!("{} driver is not open", self.name)))
    }

    fn wanted(&self) -> bool {
        self.playing || self.awaiting_landing
    }

    fn accept(&mut self, poll: WorkerPoll) -> Option<DecodedUnit> {
        match poll {
            WorkerPoll::Unit(unit) => {
                if unit.after_seek {
                    self.awaiting_landing = false;
                }
                self.current_time = unit.unit.time;
                Some(unit)
            }
            WorkerPoll::Pending => None,
            WorkerPoll::EndOfStream => {
                self.awaiting_landing = false;
                self.playing = false;
                None
            }
        }
    }
}

impl MediaDriver for StreamingDriver {
    fn open(&mut self, path: &Path) -> AnnotatorResult<StreamInfo> {
        let decoder = self.decoder.take().ok_or_else(|| {
            AnnotatorError::Decode(format!("{} driver was already opened", self.name))
        })?;
        let worker = DecodeWorker::spawn(&self.name, decoder, path, self.capacity)?;
        let info = worker.info().clone();
        self.worker = Some(worker);
        self.current_time = 0.0;
        self.playing = false;
        self.awaiting_landing = false;
        Ok(info)
    }

    fn seek(&mut self, time: f64) -> AnnotatorResult<()> {
        self.worker()?.seek(time)?;
        self.awaiting_landing = true;
        Ok(())
    }

    fn next_unit(&mut self) -> AnnotatorResult<Option<DecodedUnit>> {
        if !self.wanted() {
            return Ok(None);
        }
        let poll = self.worker()?.try_next()?;
        Ok(self.accept(poll))
    }

    fn next_unit_blocking(&mut self) -> AnnotatorResult<Option<DecodedUnit>> {
        if !self.wanted() {
            return Ok(None);
        }
        let poll = self.worker()?.next()?;
        Ok(self.accept(poll))
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn play(&mut self) -> AnnotatorResult<()> {
        self.worker()?;
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
