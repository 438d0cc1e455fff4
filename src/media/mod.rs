pub mod cache;
pub mod decoder;
pub mod payload;
pub mod range;
pub mod source;
pub mod worker;

pub use cache::{CacheRequest, CacheStats, EntryKey, MediaCache, RequestId, DEFAULT_MAX_BYTES};
pub use decoder::{
    MediaDecoder, MediaUnit, StreamInfo, StreamKind, SyntheticAudioDecoder, SyntheticVideoDecoder,
    UnitData,
};
pub use payload::{AudioBlock, ComputeParams, Payload, PayloadKind, SpectrogramBlock};
pub use range::{TimeRange, UnitRange};
pub use source::{AudioSource, AudioStream, SegmentSource, SpectrogramSource};
pub use worker::{DecodeWorker, DecodedUnit, WorkerPoll, DEFAULT_QUEUE_CAPACITY};
