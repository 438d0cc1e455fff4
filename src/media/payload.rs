use serde::{Deserialize, Serialize};

use crate::error::{AnnotatorError, AnnotatorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PayloadKind {
    Audio,
    Spectrogram,
}

/// Parameters a payload was computed with. Entries computed with different
/// parameters are never merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeParams {
    pub kind: PayloadKind,
    pub sample_rate: u32,
    pub nfft: u32,
    pub hop: u32,
}

impl ComputeParams {
    pub fn audio(sample_rate: u32) -> Self {
        Self {
            kind: PayloadKind::Audio,
            sample_rate,
            nfft: 0,
            hop: 1,
        }
    }

    pub fn spectrogram(sample_rate: u32, nfft: u32, hop: u32) -> Self {
        Self {
            kind: PayloadKind::Spectrogram,
            sample_rate,
            nfft,
            hop: hop.max(1),
        }
    }

    /// Samples per second for audio, columns per second for spectrograms.
    pub fn units_per_second(&self) -> f64 {
        match self.kind {
            PayloadKind::Audio => f64::from(self.sample_rate),
            PayloadKind::Spectrogram => f64::from(self.sample_rate) / f64::from(self.hop.max(1)),
        }
    }

    pub fn n_bins(&self) -> usize {
        self.nfft as usize / 2 + 1
    }
}

/// Mono samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioBlock {
    pub samples: Vec<f32>,
}

/// dB power columns, column-major: column `c` is `values[c * n_bins..(c + 1) * n_bins]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpectrogramBlock {
    pub n_bins: usize,
    pub values: Vec<f32>,
}

impl SpectrogramBlock {
    pub fn n_columns(&self) -> usize {
        if self.n_bins == 0 {
            0
        } else {
            self.values.len() / self.n_bins
        }
    }

    pub fn column(&self, idx: usize) -> Option<&[f32]> {
        let start = idx.checked_mul(self.n_bins)?;
        self.values.get(start..start + self.n_bins)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Audio(AudioBlock),
    Spectrogram(SpectrogramBlock),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Audio(_) => PayloadKind::Audio,
            Payload::Spectrogram(_) => PayloadKind::Spectrogram,
        }
    }

    /// Samples or columns held.
    pub fn units(&self) -> u64 {
        match self {
            Payload::Audio(block) => block.samples.len() as u64,
            Payload::Spectrogram(block) => block.n_columns() as u64,
        }
    }

    pub fn byte_size(&self) -> usize {
        match self {
            Payload::Audio(block) => block.samples.len() * std::mem::size_of::<f32>(),
            Payload::Spectrogram(block) => block.values.len() * std::mem::size_of::<f32>(),
        }
    }

    pub fn slice(&self, offset: u64, len: u64) -> Payload {
        let offset = offset as usize;
        let len = len as usize;
        match self {
            Payload::Audio(block) => {
                let end = (offset + len).min(block.samples.len());
                let start = offset.min(end);
                Payload::Audio(AudioBlock {
                    samples: block.samples[start..end].to_vec(),
                })
            }
            Payload::Spectrogram(block) => {
                let n = block.n_bins;
                let end = ((offset + len) * n).min(block.values.len());
                let start = (offset * n).min(end);
                Payload::Spectrogram(SpectrogramBlock {
                    n_bins: n,
                    values: block.values[start..end].to_vec(),
                })
            }
        }
    }

    /// Append `other`, which must directly follow `self` on the time axis.
    pub fn append(&mut self, other: Payload) -> AnnotatorResult<()> {
        match (self, other) {
            (Payload::Audio(a), Payload::Audio(b)) => {
                a.samples.extend(b.samples);
                Ok(())
            }
            (Payload::Spectrogram(a), Payload::Spectrogram(b)) => {
                if a.n_bins != b.n_bins && !a.values.is_empty() && !b.values.is_empty() {
                    return Err(AnnotatorError::Consistency(format!(
                        "cannot merge spectrogram blocks with {} and {} bins",
                        a.n_bins, b.n_bins
                    )));
                }
                if a.values.is_empty() {
                    a.n_bins = b.n_bins;
                }
                a.values.extend(b.values);
                Ok(())
            }
            (a, b) => Err(AnnotatorError::Consistency(format!(
                "cannot merge {:?} payload into {:?} payload",
                b.kind(),
                a.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spectrogram_slices_by_column() {
        let block = SpectrogramBlock {
            n_bins: 2,
            values: vec![0.0, 1.0, 10.0, 11.0, 20.0, 21.0],
        };
        let payload = Payload::Spectrogram(block);
        assert_eq!(payload.units(), 3);
        match payload.slice(1, 2) {
            Payload::Spectrogram(b) => assert_eq!(b.values, vec![10.0, 11.0, 20.0, 21.0]),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn append_rejects_mixed_kinds() {
        let mut audio = Payload::Audio(AudioBlock { samples: vec![0.0; 4] });
        let spec = Payload::Spectrogram(SpectrogramBlock { n_bins: 3, values: vec![0.0; 3] });
        assert!(audio.append(spec).is_err());
        assert!(audio
            .append(Payload::Audio(AudioBlock { samples: vec![1.0; 2] }))
            .is_ok());
        assert_eq!(audio.units(), 6);
    }

    #[test]
    fn spectrogram_rate_is_columns_per_second() {
        let params = ComputeParams::spectrogram(48_000, 1024, 512);
        assert!((params.units_per_second() - 93.75).abs() < 1e-9);
        assert_eq!(params.n_bins(), 513);
    }
}
