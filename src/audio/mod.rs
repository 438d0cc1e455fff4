//! Audio output for auditioning cached audio ranges (`playback` feature).

use std::sync::{
    atomic::{AtomicBool, Ordering},
    mpsc::{self, Sender},
    Arc, Mutex, PoisonError,
};
use std::thread;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, Sink};

use crate::annotator::Annotator;
use crate::error::{AnnotatorError, AnnotatorResult};
use crate::media::TimeRange;

use crate::{log_error, log_info};

enum AudioCommand {
    Play {
        sample_rate: u32,
        samples: Vec<f32>,
    },
    Stop,
    SetVolume(f32),
}

/// Handle to a dedicated `audio-output` thread that owns the rodio sink.
///
/// The output stream is not `Send`, so every device call happens on that
/// thread; the handle only sends commands.
pub struct AudioOutputHandle {
    tx: Mutex<Option<Sender<AudioCommand>>>,
    is_playing: Arc<AtomicBool>,
}

impl Default for AudioOutputHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioOutputHandle {
    pub fn new() -> Self {
        Self {
            tx: Mutex::new(None),
            is_playing: Arc::new(AtomicBool::new(false)),
        }
    }

    fn ensure_thread(&self) -> AnnotatorResult<Sender<AudioCommand>> {
        let mut guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = guard.as_ref() {
            return Ok(tx.clone());
        }

        let (tx, rx) = mpsc::channel::<AudioCommand>();
        let is_playing = Arc::clone(&self.is_playing);

        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                let mut _stream: Option<OutputStream> = None;
                let mut sink: Option<Sink> = None;

                fn ensure_sink(
                    stream: &mut Option<OutputStream>,
                    sink: &mut Option<Sink>,
                ) -> Result<(), String> {
                    if sink.is_none() {
                        let (s, handle) = OutputStream::try_default()
                            .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
                        let new_sink = Sink::try_new(&handle)
                            .map_err(|e| format!("Failed to create audio sink: {}", e))?;
                        *stream = Some(s);
                        *sink = Some(new_sink);
                    }
                    Ok(())
                }

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Play {
                            sample_rate,
                            samples,
                        } => {
                            if let Some(old) = sink.take() {
                                old.stop();
                            }
                            if let Err(err) = ensure_sink(&mut _stream, &mut sink) {
                                log_error!("{err}");
                                is_playing.store(false, Ordering::SeqCst);
                                continue;
                            }
                            if let Some(ref s) = sink {
                                s.append(SamplesBuffer::new(1, sample_rate, samples));
                                s.play();
                                is_playing.store(true, Ordering::SeqCst);
                            }
                        }
                        AudioCommand::Stop => {
                            if let Some(old) = sink.take() {
                                old.stop();
                            }
                            _stream = None;
                            is_playing.store(false, Ordering::SeqCst);
                        }
                        AudioCommand::SetVolume(v) => {
                            if let Some(ref s) = sink {
                                s.set_volume(v.clamp(0.0, 1.0));
                            }
                        }
                    }
                }
                log_info!("audio output thread stopped");
            })
            .map_err(|e| AnnotatorError::io("failed to spawn audio-output thread", e))?;

        *guard = Some(tx.clone());
        Ok(tx)
    }

    /// Replace whatever is playing with mono `samples`.
    pub fn play(&self, sample_rate: u32, samples: Vec<f32>) -> AnnotatorResult<()> {
        if samples.is_empty() {
            return Err(AnnotatorError::validation("nothing to play"));
        }
        let tx = self.ensure_thread()?;
        tx.send(AudioCommand::Play {
            sample_rate,
            samples,
        })
        .map_err(|_| AnnotatorError::Decode("audio output thread is gone".to_string()))
    }

    pub fn set_volume(&self, volume: f32) -> AnnotatorResult<()> {
        let tx = self.ensure_thread()?;
        tx.send(AudioCommand::SetVolume(volume))
            .map_err(|_| AnnotatorError::Decode("audio output thread is gone".to_string()))
    }

    pub fn stop(&self) {
        let tx = self.tx.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(tx) = tx {
            let _ = tx.send(AudioCommand::Stop);
        }
    }

    /// Last state reported by the output thread.
    pub fn is_playing(&self) -> bool {
        self.is_playing.load(Ordering::SeqCst)
    }
}

impl Annotator {
    /// Play `range` of the active trial's audio, served from the media cache.
    pub fn audition(&mut self, range: TimeRange, output: &AudioOutputHandle) -> AnnotatorResult<()> {
        let sample_rate = self
            .audio_sample_rate()
            .ok_or_else(|| AnnotatorError::validation("no audio loaded for this trial"))?;
        let samples = self.audio_range(range)?;
        output.play(sample_rate, samples)
    }

    /// Audition the selected labeled run.
    pub fn audition_selected(&mut self, output: &AudioOutputHandle) -> AnnotatorResult<()> {
        let fps = self
            .state()
            .dataset()
            .map(|d| d.fps())
            .ok_or_else(|| AnnotatorError::validation("no dataset loaded"))?;
        let (start, end) = self
            .editor()
            .selected_range(fps)
            .ok_or_else(|| AnnotatorError::validation("no labeled segment selected"))?;
        self.audition(TimeRange::new(start, end), output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_is_rejected_without_a_device() {
        let output = AudioOutputHandle::new();
        assert!(output.play(8000, Vec::new()).unwrap_err().is_validation());
        output.stop();
        assert!(!output.is_playing());
    }
}
