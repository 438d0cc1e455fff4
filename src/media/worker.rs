use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError};
use std::thread::{self, JoinHandle};

use tokio_util::sync::CancellationToken;

use super::decoder::{MediaDecoder, MediaUnit, StreamInfo};
use crate::error::{AnnotatorError, AnnotatorResult};

use crate::{log_error, log_info, log_warn};

/// Queue capacity used when none is configured (matches 30 frames of video).
pub const DEFAULT_QUEUE_CAPACITY: usize = 30;

enum WorkerCommand {
    Seek { time: f64, epoch: u64 },
}

enum WorkerMessage {
    Unit { epoch: u64, unit: MediaUnit },
    EndOfStream { epoch: u64 },
    Failed { epoch: u64, message: String },
}

/// A unit handed to the consumer. `after_seek` marks the first unit decoded
/// after the most recent seek, i.e. where the seek actually landed.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedUnit {
    pub unit: MediaUnit,
    pub after_seek: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WorkerPoll {
    Unit(DecodedUnit),
    Pending,
    EndOfStream,
}

/// Background decoder for one stream.
///
/// The producer blocks when the bounded queue is full. A seek bumps the epoch,
/// flushes whatever is queued and restarts decoding at the new position; units
/// tagged with an older epoch are dropped on receipt.
pub struct DecodeWorker {
    name: String,
    info: StreamInfo,
    units_rx: Option<Receiver<WorkerMessage>>,
    commands_tx: Option<Sender<WorkerCommand>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    epoch: u64,
    awaiting_landing: bool,
}

impl DecodeWorker {
    pub fn spawn(
        name: &str,
        mut decoder: Box<dyn MediaDecoder>,
        path: &Path,
        capacity: usize,
    ) -> AnnotatorResult<Self> {
        let info = decoder.open(path)?;

        let (units_tx, units_rx) = mpsc::sync_channel(capacity.max(1));
        let (commands_tx, commands_rx) = mpsc::channel();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let thread_name = format!("decode-{name}");

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || decode_loop(decoder, units_tx, commands_rx, token))
            .map_err(|err| AnnotatorError::io(format!("spawning {thread_name}"), err))?;

        log_info!("decode worker {} started for {}", name, path.display());

        Ok(Self {
            name: name.to_string(),
            info,
            units_rx: Some(units_rx),
            commands_tx: Some(commands_tx),
            cancel,
            handle: Some(handle),
            epoch: 0,
            awaiting_landing: false,
        })
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Request a seek and flush everything already queued.
    pub fn seek(&mut self, time: f64) -> AnnotatorResult<u64> {
        self.epoch += 1;
        let epoch = self.epoch;
        let tx = self
            .commands_tx
            .as_ref()
            .ok_or_else(|| AnnotatorError::Decode(format!("{} worker is shut down", self.name)))?;
        tx.send(WorkerCommand::Seek { time, epoch })
            .map_err(|_| AnnotatorError::Decode(format!("{} worker stopped", self.name)))?;

        if let Some(rx) = self.units_rx.as_ref() {
            while rx.try_recv().is_ok() {}
        }
        self.awaiting_landing = true;
        Ok(epoch)
    }

    /// Block until the next current-epoch message.
    pub fn next(&mut self) -> AnnotatorResult<WorkerPoll> {
        loop {
            let rx = self.receiver()?;
            let message = rx
                .recv()
                .map_err(|_| AnnotatorError::Decode(format!("{} worker stopped", self.name)))?;
            if let Some(poll) = self.accept(message)? {
                return Ok(poll);
            }
        }
    }

    /// Non-blocking variant of [`DecodeWorker::next`].
    pub fn try_next(&mut self) -> AnnotatorResult<WorkerPoll> {
        loop {
            let rx = self.receiver()?;
            let message = match rx.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Empty) => return Ok(WorkerPoll::Pending),
                Err(TryRecvError::Disconnected) => {
                    return Err(AnnotatorError::Decode(format!("{} worker stopped", self.name)))
                }
            };
            if let Some(poll) = self.accept(message)? {
                return Ok(poll);
            }
        }
    }

    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        self.commands_tx.take();
        self.units_rx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log_error!("decode worker {} panicked", self.name);
            } else {
                log_info!("decode worker {} stopped", self.name);
            }
        }
    }

    fn receiver(&self) -> AnnotatorResult<&Receiver<WorkerMessage>> {
        self.units_rx
            .as_ref()
            .ok_or_else(|| AnnotatorError::Decode(format!("{} worker is shut down", self.name)))
    }

    fn accept(&mut self, message: WorkerMessage) -> AnnotatorResult<Option<WorkerPoll>> {
        match message {
            WorkerMessage::Unit { epoch, unit } => {
                if epoch != self.epoch {
                    return Ok(None);
                }
                let after_seek = std::mem::take(&mut self.awaiting_landing);
                Ok(Some(WorkerPoll::Unit(DecodedUnit { unit, after_seek })))
            }
            WorkerMessage::EndOfStream { epoch } => {
                if epoch != self.epoch {
                    return Ok(None);
                }
                Ok(Some(WorkerPoll::EndOfStream))
            }
            WorkerMessage::Failed { epoch, message } => {
                if epoch != self.epoch {
                    return Ok(None);
                }
                Err(AnnotatorError::Decode(message))
            }
        }
    }
}

impl Drop for DecodeWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn decode_loop(
    mut decoder: Box<dyn MediaDecoder>,
    units_tx: SyncSender<WorkerMessage>,
    commands_rx: Receiver<WorkerCommand>,
    cancel: CancellationToken,
) {
    let mut epoch = 0u64;
    let mut idle = false;

    loop {
        if cancel.is_cancelled() {
            break;
        }

        // Idle after end of stream or a failure until the next seek.
        if idle {
            match commands_rx.recv() {
                Ok(WorkerCommand::Seek { time, epoch: e }) => {
                    epoch = e;
                    idle = !apply_seek(decoder.as_mut(), time, epoch, &units_tx);
                }
                Err(_) => break,
            }
            continue;
        }

        loop {
            match commands_rx.try_recv() {
                Ok(WorkerCommand::Seek { time, epoch: e }) => {
                    epoch = e;
                    idle = !apply_seek(decoder.as_mut(), time, epoch, &units_tx);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => return,
            }
        }
        if idle {
            continue;
        }

        let message = match decoder.next_unit() {
            Ok(Some(unit)) => WorkerMessage::Unit { epoch, unit },
            Ok(None) => {
                idle = true;
                WorkerMessage::EndOfStream { epoch }
            }
            Err(err) => {
                log_warn!("decode failed: {err}");
                idle = true;
                WorkerMessage::Failed {
                    epoch,
                    message: err.to_string(),
                }
            }
        };

        if units_tx.send(message).is_err() {
            break;
        }
    }
}

/// Returns false when the seek failed; the failure is queued for the consumer.
fn apply_seek(
    decoder: &mut dyn MediaDecoder,
    time: f64,
    epoch: u64,
    units_tx: &SyncSender<WorkerMessage>,
) -> bool {
    match decoder.seek(time) {
        Ok(_) => true,
        Err(err) => {
            log_warn!("seek to {time:.3}s failed: {err}");
            let _ = units_tx.send(WorkerMessage::Failed {
                epoch,
                message: err.to_string(),
            });
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::decoder::SyntheticVideoDecoder;

    fn spawn_video(n_frames: u64, capacity: usize) -> DecodeWorker {
        DecodeWorker::spawn(
            "video",
            Box::new(SyntheticVideoDecoder::new(10.0, n_frames)),
            Path::new("trial.mp4"),
            capacity,
        )
        .unwrap()
    }

    fn next_frame(worker: &mut DecodeWorker) -> DecodedUnit {
        match worker.next().unwrap() {
            WorkerPoll::Unit(unit) => unit,
            other => panic!("expected a unit, got {other:?}"),
        }
    }

    #[test]
    fn delivers_frames_in_order_then_end_of_stream() {
        let mut worker = spawn_video(5, 2);
        for expected in 0..5 {
            let unit = next_frame(&mut worker);
            assert_eq!(unit.unit.frame_index(), Some(expected));
            assert!(!unit.after_seek);
        }
        assert_eq!(worker.next().unwrap(), WorkerPoll::EndOfStream);
    }

    #[test]
    fn seek_discards_queued_frames() {
        let mut worker = spawn_video(100, 4);
        next_frame(&mut worker);
        worker.seek(5.0).unwrap();
        let landed = next_frame(&mut worker);
        assert!(landed.after_seek);
        assert_eq!(landed.unit.frame_index(), Some(50));
        let following = next_frame(&mut worker);
        assert!(!following.after_seek);
        assert_eq!(following.unit.frame_index(), Some(51));
    }

    #[test]
    fn seek_restarts_after_end_of_stream() {
        let mut worker = spawn_video(3, 8);
        while worker.next().unwrap() != WorkerPoll::EndOfStream {}
        worker.seek(0.1).unwrap();
        assert_eq!(next_frame(&mut worker).unit.frame_index(), Some(1));
    }

    #[test]
    fn shutdown_unblocks_full_queue() {
        let mut worker = spawn_video(1_000, 1);
        worker.shutdown();
        assert!(worker.next().is_err());
    }
}
