use std::f32::consts::PI;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use realfft::RealFftPlanner;
use tokio_util::sync::CancellationToken;

use super::decoder::{MediaDecoder, MediaUnit, StreamInfo, StreamKind, UnitData};
use super::payload::{AudioBlock, ComputeParams, Payload, PayloadKind, SpectrogramBlock};
use super::range::UnitRange;
use crate::error::{AnnotatorError, AnnotatorResult};

/// Samples copied between cancellation checks.
const AUDIO_CHUNK: usize = 1 << 16;
/// Columns computed between cancellation checks.
const COLUMN_CHUNK: usize = 64;
const POWER_FLOOR: f32 = 1e-12;
/// Chunk rate of [`AudioStream`], 20 ms per unit.
const STREAM_CHUNKS_PER_SEC: u32 = 50;

/// Something that can produce any sub-range of a payload independently.
///
/// Called from the cache's compute thread. Implementations poll `cancel` at
/// chunk boundaries and return `AnnotatorError::Cancelled` once it fires.
pub trait SegmentSource: Send + Sync {
    fn kind(&self) -> PayloadKind;

    /// Length of the content in units under `params`.
    fn total_units(&self, params: &ComputeParams) -> u64;

    fn compute(
        &self,
        range: UnitRange,
        params: &ComputeParams,
        cancel: &CancellationToken,
    ) -> AnnotatorResult<Payload>;
}

/// Mono audio of one trial, decoded on demand.
///
/// A decoder-backed source keeps one handle for the whole trial. Reads that
/// continue where the previous one stopped reuse the decoder position; any
/// other read seeks first.
pub struct AudioSource {
    backing: Backing,
    info: StreamInfo,
    sample_rate: u32,
    total: u64,
}

enum Backing {
    Memory(Arc<Vec<f32>>),
    Decoder(Mutex<DecoderCursor>),
}

struct DecoderCursor {
    decoder: Box<dyn MediaDecoder>,
    /// Sample index of `carry[0]`; `None` after a failed read.
    position: Option<u64>,
    /// Decoded samples past the end of the last read.
    carry: Vec<f32>,
}

impl DecoderCursor {
    fn read(
        &mut self,
        start: u64,
        end: u64,
        sample_rate: u32,
        cancel: &CancellationToken,
    ) -> AnnotatorResult<Vec<f32>> {
        let len = (end - start) as usize;
        let position = match self.position {
            Some(pos) if pos <= start && start <= pos + self.carry.len() as u64 => pos,
            _ => {
                let landed = self.decoder.seek(start as f64 / f64::from(sample_rate))?;
                self.carry.clear();
                (landed.max(0.0) * f64::from(sample_rate)).round() as u64
            }
        };
        self.position = None;

        let mut buffered = std::mem::take(&mut self.carry);
        while position + (buffered.len() as u64) < end {
            if cancel.is_cancelled() {
                return Err(AnnotatorError::Cancelled);
            }
            match self.decoder.next_unit()? {
                Some(unit) => mix_into(&mut buffered, unit, sample_rate)?,
                None => break,
            }
        }

        let mut out = Vec::with_capacity(len);
        // A seek that lands late leaves silence in front.
        out.resize(position.saturating_sub(start).min(len as u64) as usize, 0.0);
        let skip = (start.saturating_sub(position) as usize).min(buffered.len());
        let take = (len - out.len()).min(buffered.len() - skip);
        out.extend_from_slice(&buffered[skip..skip + take]);
        out.resize(len, 0.0);

        let consumed = skip + take;
        self.carry = buffered.split_off(consumed);
        self.position = Some(position + consumed as u64);
        Ok(out)
    }
}

fn mix_into(buffer: &mut Vec<f32>, unit: MediaUnit, expected_rate: u32) -> AnnotatorResult<()> {
    let UnitData::Audio {
        sample_rate,
        channels,
        samples,
    } = unit.data
    else {
        return Err(AnnotatorError::Decode(
            "video frame on an audio stream".to_string(),
        ));
    };
    if sample_rate != expected_rate {
        return Err(AnnotatorError::Decode(format!(
            "sample rate changed mid-stream ({expected_rate} -> {sample_rate})"
        )));
    }
    let channels = usize::from(channels.max(1));
    buffer.extend(
        samples
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32),
    );
    Ok(())
}

impl fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backing = match self.backing {
            Backing::Memory(_) => "memory",
            Backing::Decoder(_) => "decoder",
        };
        f.debug_struct("AudioSource")
            .field("backing", &backing)
            .field("sample_rate", &self.sample_rate)
            .field("total", &self.total)
            .finish()
    }
}

impl AudioSource {
    pub fn from_samples(samples: Vec<f32>, sample_rate: u32) -> Self {
        let total = samples.len() as u64;
        Self {
            info: StreamInfo {
                kind: StreamKind::Audio,
                duration_secs: total as f64 / f64::from(sample_rate.max(1)),
                unit_rate: f64::from(sample_rate.max(1)),
                sample_rate: Some(sample_rate),
                channels: 1,
            },
            backing: Backing::Memory(Arc::new(samples)),
            sample_rate,
            total,
        }
    }

    /// Open `path` and keep the decoder for later reads. Nothing is decoded yet.
    pub fn open(mut decoder: Box<dyn MediaDecoder>, path: &Path) -> AnnotatorResult<Self> {
        let info = decoder.open(path)?;
        if info.kind != StreamKind::Audio {
            return Err(AnnotatorError::Decode(format!(
                "{} is not an audio stream",
                path.display()
            )));
        }
        let sample_rate = info
            .sample_rate
            .filter(|sr| *sr > 0)
            .ok_or_else(|| AnnotatorError::Decode(format!("{} has no sample rate", path.display())))?;
        let total = (info.duration_secs.max(0.0) * f64::from(sample_rate)).round() as u64;
        Ok(Self {
            backing: Backing::Decoder(Mutex::new(DecoderCursor {
                decoder,
                position: Some(0),
                carry: Vec::new(),
            })),
            info,
            sample_rate,
            total,
        })
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.total as usize
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn duration_secs(&self) -> f64 {
        self.total as f64 / f64::from(self.sample_rate.max(1))
    }

    /// Mono samples `[start, end)`, clamped to the stream length.
    pub fn read(&self, start: u64, end: u64, cancel: &CancellationToken) -> AnnotatorResult<Vec<f32>> {
        let end = end.min(self.total);
        let start = start.min(end);
        match &self.backing {
            Backing::Memory(samples) => {
                let mut out = Vec::with_capacity((end - start) as usize);
                for chunk in samples[start as usize..end as usize].chunks(AUDIO_CHUNK) {
                    if cancel.is_cancelled() {
                        return Err(AnnotatorError::Cancelled);
                    }
                    out.extend_from_slice(chunk);
                }
                Ok(out)
            }
            Backing::Decoder(cursor) => {
                if start == end {
                    return Ok(Vec::new());
                }
                let mut cursor = cursor.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                cursor.read(start, end, self.sample_rate, cancel)
            }
        }
    }

    /// Samples `[lo, hi)` with zeros outside the stream.
    fn window(&self, lo: i64, hi: i64, cancel: &CancellationToken) -> AnnotatorResult<Vec<f32>> {
        let len = (hi - lo).max(0) as usize;
        let inner_lo = lo.clamp(0, self.total as i64);
        let inner_hi = hi.clamp(inner_lo, self.total as i64);
        let mut out = vec![0.0; (inner_lo - lo).clamp(0, len as i64) as usize];
        out.extend(self.read(inner_lo as u64, inner_hi as u64, cancel)?);
        out.resize(len, 0.0);
        Ok(out)
    }

    fn check_rate(&self, params: &ComputeParams) -> AnnotatorResult<()> {
        if params.sample_rate != self.sample_rate {
            return Err(AnnotatorError::validation(format!(
                "requested {} Hz but audio is {} Hz",
                params.sample_rate, self.sample_rate
            )));
        }
        Ok(())
    }
}

impl SegmentSource for AudioSource {
    fn kind(&self) -> PayloadKind {
        PayloadKind::Audio
    }

    fn total_units(&self, _params: &ComputeParams) -> u64 {
        self.total
    }

    fn compute(
        &self,
        range: UnitRange,
        params: &ComputeParams,
        cancel: &CancellationToken,
    ) -> AnnotatorResult<Payload> {
        self.check_rate(params)?;
        if cancel.is_cancelled() {
            return Err(AnnotatorError::Cancelled);
        }
        let samples = self.read(range.start, range.end, cancel)?;
        Ok(Payload::Audio(AudioBlock { samples }))
    }
}

/// Sequential chunked reader over an [`AudioSource`].
///
/// Hands the trial's single decoder handle to a stream driver, so the driver
/// and the cache never decode the same file twice.
pub struct AudioStream {
    source: Arc<AudioSource>,
    chunk: u64,
    next: u64,
}

impl AudioStream {
    pub fn new(source: Arc<AudioSource>) -> Self {
        let chunk = u64::from(source.sample_rate / STREAM_CHUNKS_PER_SEC).max(1);
        Self {
            source,
            chunk,
            next: 0,
        }
    }
}

impl MediaDecoder for AudioStream {
    fn open(&mut self, _path: &Path) -> AnnotatorResult<StreamInfo> {
        self.next = 0;
        Ok(StreamInfo {
            unit_rate: f64::from(self.source.sample_rate) / self.chunk as f64,
            channels: 1,
            ..self.source.info.clone()
        })
    }

    fn seek(&mut self, time: f64) -> AnnotatorResult<f64> {
        let sr = f64::from(self.source.sample_rate);
        self.next = ((time.max(0.0) * sr).round() as u64).min(self.source.total);
        Ok(self.next as f64 / sr)
    }

    fn next_unit(&mut self) -> AnnotatorResult<Option<MediaUnit>> {
        if self.next >= self.source.total {
            return Ok(None);
        }
        let start = self.next;
        let end = (start + self.chunk).min(self.source.total);
        let samples = self.source.read(start, end, &CancellationToken::new())?;
        self.next = end;
        Ok(Some(MediaUnit {
            time: start as f64 / f64::from(self.source.sample_rate),
            data: UnitData::Audio {
                sample_rate: self.source.sample_rate,
                channels: 1,
                samples,
            },
        }))
    }
}

/// Power spectrogram in dB over an [`AudioSource`].
///
/// Column `c` is centred on sample `c * hop` with a Hann window of `nfft`
/// samples, zero-padded at the edges, so every column is independent of
/// which range it was computed in.
#[derive(Debug, Clone)]
pub struct SpectrogramSource {
    audio: Arc<AudioSource>,
}

impl SpectrogramSource {
    pub fn new(audio: Arc<AudioSource>) -> Self {
        Self { audio }
    }

    pub fn audio(&self) -> &AudioSource {
        &self.audio
    }
}

impl SegmentSource for SpectrogramSource {
    fn kind(&self) -> PayloadKind {
        PayloadKind::Spectrogram
    }

    fn total_units(&self, params: &ComputeParams) -> u64 {
        let hop = u64::from(params.hop.max(1));
        (self.audio.len() as u64).div_ceil(hop)
    }

    fn compute(
        &self,
        range: UnitRange,
        params: &ComputeParams,
        cancel: &CancellationToken,
    ) -> AnnotatorResult<Payload> {
        self.audio.check_rate(params)?;
        let nfft = params.nfft as usize;
        if nfft < 2 {
            return Err(AnnotatorError::validation(format!(
                "nfft must be at least 2, got {nfft}"
            )));
        }
        let hop = params.hop.max(1) as usize;
        let n_bins = params.n_bins();
        let end = range.end.min(self.total_units(params));
        let start = range.start.min(end);

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(nfft);
        let mut indata = fft.make_input_vec();
        let mut spectrum = fft.make_output_vec();

        let window: Vec<f32> = (0..nfft)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / nfft as f32).cos())
            .collect();
        let window_power: f32 = window.iter().map(|w| w * w).sum();
        let scale = 1.0 / (self.audio.sample_rate as f32 * window_power);

        let half = (nfft / 2) as i64;
        let mut values = Vec::with_capacity((end - start) as usize * n_bins);
        if start == end {
            return Ok(Payload::Spectrogram(SpectrogramBlock { n_bins, values }));
        }
        // Every sample any column in the range touches.
        let lo = start as i64 * hop as i64 - half;
        let hi = (end as i64 - 1) * hop as i64 - half + nfft as i64;
        let samples = self.audio.window(lo, hi, cancel)?;

        for (done, column) in (start..end).enumerate() {
            if done % COLUMN_CHUNK == 0 && cancel.is_cancelled() {
                return Err(AnnotatorError::Cancelled);
            }

            let offset = (column as i64 * hop as i64 - half - lo) as usize;
            for (i, slot) in indata.iter_mut().enumerate() {
                let sample = samples.get(offset + i).copied().unwrap_or(0.0);
                *slot = sample * window[i];
            }

            fft.process(&mut indata, &mut spectrum)
                .map_err(|err| AnnotatorError::Decode(format!("fft failed: {err}")))?;

            let last = spectrum.len() - 1;
            for (bin, value) in spectrum.iter().enumerate() {
                let one_sided = if bin == 0 || bin == last { 1.0 } else { 2.0 };
                let power = value.norm_sqr() * scale * one_sided;
                values.push(10.0 * power.max(POWER_FLOOR).log10());
            }
        }

        Ok(Payload::Spectrogram(SpectrogramBlock { n_bins, values }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::media::decoder::SyntheticAudioDecoder;

    fn tone(sample_rate: u32, freq: f32, secs: f32) -> Vec<f32> {
        let n = (sample_rate as f32 * secs) as usize;
        (0..n)
            .map(|i| (2.0 * PI * freq * i as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn audio_slices_by_sample() {
        let source = AudioSource::from_samples((0..100).map(|i| i as f32).collect(), 100);
        let payload = source
            .compute(
                UnitRange::new(10, 20),
                &ComputeParams::audio(100),
                &CancellationToken::new(),
            )
            .unwrap();
        match payload {
            Payload::Audio(block) => assert_eq!(block.samples[0], 10.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_mismatched_sample_rate() {
        let source = AudioSource::from_samples(vec![0.0; 10], 100);
        let err = source
            .compute(UnitRange::new(0, 5), &ComputeParams::audio(200), &CancellationToken::new())
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn cancelled_token_stops_work() {
        let source = AudioSource::from_samples(vec![0.0; 10], 100);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = source
            .compute(UnitRange::new(0, 5), &ComputeParams::audio(100), &cancel)
            .unwrap_err();
        assert!(matches!(err, AnnotatorError::Cancelled));
    }

    #[test]
    fn spectrogram_peaks_at_tone_bin() {
        let sr = 8_000;
        let audio = Arc::new(AudioSource::from_samples(tone(sr, 1_000.0, 0.5), sr));
        let source = SpectrogramSource::new(audio);
        let params = ComputeParams::spectrogram(sr, 256, 128);

        let payload = source
            .compute(UnitRange::new(10, 12), &params, &CancellationToken::new())
            .unwrap();
        let Payload::Spectrogram(block) = payload else {
            panic!("expected spectrogram");
        };
        assert_eq!(block.n_bins, 129);
        assert_eq!(block.n_columns(), 2);

        let column = block.column(0).unwrap();
        let peak = column
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap();
        // 1 kHz at 8 kHz / 256 points is bin 32.
        assert_eq!(peak, 32);
    }

    #[test]
    fn spectrogram_columns_do_not_depend_on_range() {
        let sr = 4_000;
        let audio = Arc::new(AudioSource::from_samples(tone(sr, 300.0, 0.25), sr));
        let source = SpectrogramSource::new(audio);
        let params = ComputeParams::spectrogram(sr, 64, 32);
        let cancel = CancellationToken::new();

        let whole = source.compute(UnitRange::new(0, 8), &params, &cancel).unwrap();
        let tail = source.compute(UnitRange::new(4, 8), &params, &cancel).unwrap();
        assert_eq!(whole.slice(4, 4), tail);
    }

    /// Counts the units pulled from the wrapped decoder.
    struct Counted {
        inner: SyntheticAudioDecoder,
        units: Arc<AtomicUsize>,
        seeks: Arc<AtomicUsize>,
    }

    impl MediaDecoder for Counted {
        fn open(&mut self, path: &Path) -> AnnotatorResult<StreamInfo> {
            self.inner.open(path)
        }

        fn seek(&mut self, time: f64) -> AnnotatorResult<f64> {
            self.seeks.fetch_add(1, Ordering::SeqCst);
            self.inner.seek(time)
        }

        fn next_unit(&mut self) -> AnnotatorResult<Option<MediaUnit>> {
            self.units.fetch_add(1, Ordering::SeqCst);
            self.inner.next_unit()
        }
    }

    fn counted(sample_rate: u32, secs: f64) -> (AudioSource, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let units = Arc::new(AtomicUsize::new(0));
        let seeks = Arc::new(AtomicUsize::new(0));
        let decoder = Counted {
            inner: SyntheticAudioDecoder::new(sample_rate, secs, 50.0),
            units: units.clone(),
            seeks: seeks.clone(),
        };
        let source = AudioSource::open(Box::new(decoder), Path::new("trial_1.wav")).unwrap();
        (source, units, seeks)
    }

    fn audio(payload: Payload) -> Vec<f32> {
        match payload {
            Payload::Audio(block) => block.samples,
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn open_decodes_nothing() {
        let (source, units, _) = counted(1_000, 10.0);
        assert_eq!(source.len(), 10_000);
        assert_eq!(source.sample_rate(), 1_000);
        assert_eq!(units.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn decoder_reads_only_the_requested_range() {
        let (source, units, _) = counted(1_000, 10.0);
        let params = ComputeParams::audio(1_000);
        let cancel = CancellationToken::new();

        let tail = audio(source.compute(UnitRange::new(9_000, 9_100), &params, &cancel).unwrap());
        assert_eq!(tail.len(), 100);
        // 20-sample chunks from the synthetic decoder.
        assert!(units.load(Ordering::SeqCst) <= 6);

        let mut reference = SyntheticAudioDecoder::new(1_000, 10.0, 50.0);
        reference.open(Path::new("trial_1.wav")).unwrap();
        reference.seek(9.0).unwrap();
        let UnitData::Audio { samples, .. } = reference.next_unit().unwrap().unwrap().data else {
            panic!("expected audio");
        };
        assert_eq!(&tail[..20], &samples[..]);
    }

    #[test]
    fn contiguous_reads_reuse_the_decoder_position() {
        let (source, _, seeks) = counted(1_000, 2.0);
        let cancel = CancellationToken::new();
        let whole = source.read(0, 300, &cancel).unwrap();

        let (source, _, seeks_split) = counted(1_000, 2.0);
        let mut parts = source.read(0, 110, &cancel).unwrap();
        parts.extend(source.read(110, 300, &cancel).unwrap());

        assert_eq!(whole, parts);
        assert_eq!(seeks.load(Ordering::SeqCst), 0);
        assert_eq!(seeks_split.load(Ordering::SeqCst), 0);

        source.read(1_000, 1_010, &cancel).unwrap();
        assert_eq!(seeks_split.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stream_walks_the_shared_source() {
        let (source, _, _) = counted(1_000, 0.2);
        let source = Arc::new(source);
        let mut stream = AudioStream::new(source.clone());
        let info = stream.open(Path::new("trial_1.wav")).unwrap();
        assert_eq!(info.sample_rate, Some(1_000));
        assert_eq!(info.unit_rate, 50.0);

        let mut streamed = Vec::new();
        while let Some(unit) = stream.next_unit().unwrap() {
            if let UnitData::Audio { samples, .. } = unit.data {
                streamed.extend(samples);
            }
        }
        assert_eq!(streamed.len(), 200);
        assert_eq!(streamed, source.read(0, 200, &CancellationToken::new()).unwrap());
    }

    #[test]
    fn spectrogram_over_decoder_matches_memory() {
        let sr = 1_000;
        let (lazy, _, _) = counted(sr, 1.0);
        let all = lazy.read(0, 1_000, &CancellationToken::new()).unwrap();
        let memory = SpectrogramSource::new(Arc::new(AudioSource::from_samples(all, sr)));
        let decoded = SpectrogramSource::new(Arc::new(lazy));
        let params = ComputeParams::spectrogram(sr, 64, 32);
        let cancel = CancellationToken::new();

        let range = UnitRange::new(0, 10);
        assert_eq!(
            decoded.compute(range, &params, &cancel).unwrap(),
            memory.compute(range, &params, &cancel).unwrap()
        );
    }
}
