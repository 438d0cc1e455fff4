use std::path::Path;

use serde::{Deserialize, Serialize};

use super::buffered::BufferedDriver;
use super::streaming::StreamingDriver;
use crate::error::AnnotatorResult;
use crate::media::{DecodedUnit, MediaDecoder, StreamInfo};

/// Playback capability shared by the buffered and streaming implementations.
///
/// `next_unit` never blocks. While stopped it yields only the unit a seek
/// landed on (flagged `after_seek`); while playing it yields one unit per call
/// and the host calls it at the playback rate.
pub trait MediaDriver {
    fn open(&mut self, path: &Path) -> AnnotatorResult<StreamInfo>;

    fn seek(&mut self, time: f64) -> AnnotatorResult<()>;

    fn next_unit(&mut self) -> AnnotatorResult<Option<DecodedUnit>>;

    /// Like `next_unit` but waits for a unit the decoder has not produced yet.
    fn next_unit_blocking(&mut self) -> AnnotatorResult<Option<DecodedUnit>> {
        self.next_unit()
    }

    fn current_time(&self) -> f64;

    fn play(&mut self) -> AnnotatorResult<()>;

    fn stop(&mut self);

    fn is_playing(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DriverKind {
    #[default]
    Buffered,
    Streaming,
}

pub fn make_driver(
    kind: DriverKind,
    decoder: Box<dyn MediaDecoder>,
    queue_capacity: usize,
) -> Box<dyn MediaDriver> {
    match kind {
        DriverKind::Buffered => Box::new(BufferedDriver::new(decoder)),
        DriverKind::Streaming => Box::new(StreamingDriver::new(decoder, queue_capacity)),
    }
}
