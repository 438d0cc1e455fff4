use std::collections::BTreeMap;

use crate::error::{AnnotatorError, AnnotatorResult};
use crate::motifs::{MotifId, BACKGROUND_MOTIF};
use crate::state::Selection;

use super::schema::{Coord, DatasetSchema, DimensionKind, TrialId};
use super::{Dataset, TrialMedia};

#[derive(Debug, Clone, Default)]
struct TrialData {
    n_frames: usize,
    labels: BTreeMap<String, Vec<MotifId>>,
    changepoints: BTreeMap<String, Vec<bool>>,
    /// Keyed by (keypoint, individual, feature).
    features: BTreeMap<(String, String, String), Vec<f64>>,
    media: TrialMedia,
}

/// Dataset held fully in memory. Used for headless sessions and tests, and as
/// the target a host-side loader fills in.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    fps: f64,
    schema: DatasetSchema,
    trials: BTreeMap<TrialId, TrialData>,
    keypoints: Vec<String>,
    individuals: Vec<String>,
    features: Vec<String>,
}

impl InMemoryDataset {
    pub fn new(fps: f64) -> Self {
        Self {
            fps,
            schema: DatasetSchema::new(),
            trials: BTreeMap::new(),
            keypoints: Vec::new(),
            individuals: Vec::new(),
            features: Vec::new(),
        }
    }

    /// Add a trial with empty (background) labels for each keypoint.
    pub fn with_trial(mut self, trial: TrialId, n_frames: usize, keypoints: &[&str]) -> Self {
        let data = self.trials.entry(trial).or_default();
        data.n_frames = n_frames;
        for kp in keypoints {
            data.labels
                .insert(kp.to_string(), vec![BACKGROUND_MOTIF; n_frames]);
            data.changepoints.insert(kp.to_string(), vec![false; n_frames]);
            if !self.keypoints.iter().any(|k| k == kp) {
                self.keypoints.push(kp.to_string());
            }
        }
        self.rebuild_schema();
        self
    }

    pub fn set_changepoints(
        &mut self,
        trial: TrialId,
        keypoint: &str,
        frames: &[usize],
    ) -> AnnotatorResult<()> {
        let data = self.trial_mut(trial)?;
        let n_frames = data.n_frames;
        let track = data
            .changepoints
            .get_mut(keypoint)
            .ok_or_else(|| unknown_keypoint(keypoint))?;
        track.fill(false);
        for &frame in frames {
            if frame >= n_frames {
                return Err(AnnotatorError::validation(format!(
                    "changepoint frame {frame} outside trial {trial} ({n_frames} frames)"
                )));
            }
            track[frame] = true;
        }
        Ok(())
    }

    pub fn set_feature(
        &mut self,
        trial: TrialId,
        keypoint: &str,
        individual: &str,
        feature: &str,
        series: Vec<f64>,
    ) -> AnnotatorResult<()> {
        let data = self.trial_mut(trial)?;
        if series.len() != data.n_frames {
            return Err(AnnotatorError::validation(format!(
                "feature series has {} samples, trial {trial} has {} frames",
                series.len(),
                data.n_frames
            )));
        }
        data.features.insert(
            (keypoint.to_string(), individual.to_string(), feature.to_string()),
            series,
        );
        if !self.individuals.iter().any(|i| i == individual) {
            self.individuals.push(individual.to_string());
        }
        if !self.features.iter().any(|f| f == feature) {
            self.features.push(feature.to_string());
        }
        self.rebuild_schema();
        Ok(())
    }

    pub fn set_media(&mut self, trial: TrialId, media: TrialMedia) -> AnnotatorResult<()> {
        self.trial_mut(trial)?.media = media;
        Ok(())
    }

    fn trial(&self, trial: TrialId) -> AnnotatorResult<&TrialData> {
        self.trials
            .get(&trial)
            .ok_or_else(|| AnnotatorError::validation(format!("unknown trial {trial}")))
    }

    fn trial_mut(&mut self, trial: TrialId) -> AnnotatorResult<&mut TrialData> {
        self.trials
            .get_mut(&trial)
            .ok_or_else(|| AnnotatorError::validation(format!("unknown trial {trial}")))
    }

    fn rebuild_schema(&mut self) {
        let mut schema = DatasetSchema::new();
        schema.set_dimension(
            "trials",
            self.trials.keys().map(|t| Coord::Int(i64::from(*t))).collect(),
        );
        schema.set_dimension(
            "keypoints",
            self.keypoints.iter().map(|k| Coord::Text(k.clone())).collect(),
        );
        if !self.individuals.is_empty() {
            schema.set_dimension(
                "individuals",
                self.individuals.iter().map(|i| Coord::Text(i.clone())).collect(),
            );
        }
        if !self.features.is_empty() {
            schema.set_dimension(
                "features",
                self.features.iter().map(|f| Coord::Text(f.clone())).collect(),
            );
        }
        self.schema = schema;
    }
}

fn unknown_keypoint(keypoint: &str) -> AnnotatorError {
    AnnotatorError::validation(format!("unknown keypoint '{keypoint}'"))
}

impl Dataset for InMemoryDataset {
    fn fps(&self) -> f64 {
        self.fps
    }

    fn schema(&self) -> &DatasetSchema {
        &self.schema
    }

    fn n_frames(&self, trial: TrialId) -> AnnotatorResult<usize> {
        Ok(self.trial(trial)?.n_frames)
    }

    fn feature_series(&self, selection: &Selection) -> AnnotatorResult<Vec<f64>> {
        let trial = selection
            .trial()
            .ok_or_else(|| AnnotatorError::validation("no trial selected"))?;
        let keypoint = selection
            .text_of(DimensionKind::Keypoint)
            .ok_or_else(|| AnnotatorError::validation("no keypoint selected"))?;
        let individual = selection.text_of(DimensionKind::Individual).unwrap_or_default();
        let feature = selection
            .text_of(DimensionKind::Feature)
            .ok_or_else(|| AnnotatorError::validation("no feature selected"))?;

        self.trial(trial)?
            .features
            .get(&(keypoint.clone(), individual.clone(), feature.clone()))
            .cloned()
            .ok_or_else(|| {
                AnnotatorError::validation(format!(
                    "no series for {keypoint}/{individual}/{feature} in trial {trial}"
                ))
            })
    }

    fn labels(&self, trial: TrialId, keypoint: &str) -> AnnotatorResult<&[MotifId]> {
        self.trial(trial)?
            .labels
            .get(keypoint)
            .map(|v| v.as_slice())
            .ok_or_else(|| unknown_keypoint(keypoint))
    }

    fn labels_mut(&mut self, trial: TrialId, keypoint: &str) -> AnnotatorResult<&mut [MotifId]> {
        self.trial_mut(trial)?
            .labels
            .get_mut(keypoint)
            .map(|v| v.as_mut_slice())
            .ok_or_else(|| unknown_keypoint(keypoint))
    }

    fn changepoints(&self, trial: TrialId, keypoint: &str) -> AnnotatorResult<&[bool]> {
        self.trial(trial)?
            .changepoints
            .get(keypoint)
            .map(|v| v.as_slice())
            .ok_or_else(|| unknown_keypoint(keypoint))
    }

    fn media(&self, trial: TrialId) -> TrialMedia {
        self.trials
            .get(&trial)
            .map(|t| t.media.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_populates_schema_and_tracks() {
        let mut ds = InMemoryDataset::new(30.0)
            .with_trial(1, 90, &["beak", "tail"])
            .with_trial(2, 60, &["beak", "tail"]);
        ds.set_feature(1, "beak", "bird1", "speed", vec![0.5; 90]).unwrap();

        let trials = ds.schema().by_kind(DimensionKind::Trial).unwrap();
        assert_eq!(trials.coords, vec![Coord::Int(1), Coord::Int(2)]);
        assert_eq!(ds.labels(2, "tail").unwrap().len(), 60);
        assert!(ds.schema().by_kind(DimensionKind::Feature).is_some());
        assert!(ds.labels(3, "beak").is_err());
        assert!(ds.set_feature(2, "beak", "bird1", "speed", vec![1.0; 10]).is_err());
    }

    #[test]
    fn changepoints_are_range_checked() {
        let mut ds = InMemoryDataset::new(10.0).with_trial(1, 20, &["beak"]);
        ds.set_changepoints(1, "beak", &[3, 7]).unwrap();
        let cps = ds.changepoints(1, "beak").unwrap();
        assert!(cps[3] && cps[7] && !cps[4]);
        assert!(ds.set_changepoints(1, "beak", &[20]).is_err());
    }
}
