use serde::{Deserialize, Serialize};

use crate::motifs::{MotifId, BACKGROUND_MOTIF};

/// A maximal run of identical label values, `[start, end)` in frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelRun {
    pub start: usize,
    pub end: usize,
    pub motif_id: MotifId,
}

impl LabelRun {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, frame: usize) -> bool {
        frame >= self.start && frame < self.end
    }
}

/// All non-background runs in frame order.
pub fn label_runs(labels: &[MotifId]) -> Vec<LabelRun> {
    let mut runs = Vec::new();
    let mut i = 0;
    while i < labels.len() {
        let id = labels[i];
        let start = i;
        while i < labels.len() && labels[i] == id {
            i += 1;
        }
        if id != BACKGROUND_MOTIF {
            runs.push(LabelRun {
                start,
                end: i,
                motif_id: id,
            });
        }
    }
    runs
}

/// The maximal run containing `frame`, background included.
pub fn run_at(labels: &[MotifId], frame: usize) -> Option<LabelRun> {
    let id = *labels.get(frame)?;

    let mut start = frame;
    while start > 0 && labels[start - 1] == id {
        start -= 1;
    }

    let mut end = frame + 1;
    while end < labels.len() && labels[end] == id {
        end += 1;
    }

    Some(LabelRun {
        start,
        end,
        motif_id: id,
    })
}

/// Clear non-background runs shorter than `min_len` frames. Returns how many
/// runs were removed.
pub fn remove_short_runs(labels: &mut [MotifId], min_len: usize) -> usize {
    let short: Vec<LabelRun> = label_runs(labels)
        .into_iter()
        .filter(|run| run.len() < min_len)
        .collect();

    for run in &short {
        labels[run.start..run.end].fill(BACKGROUND_MOTIF);
    }
    short.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_skip_background() {
        let labels = [0, 1, 1, 0, 2, 2, 2, 1];
        let runs = label_runs(&labels);
        assert_eq!(
            runs,
            vec![
                LabelRun { start: 1, end: 3, motif_id: 1 },
                LabelRun { start: 4, end: 7, motif_id: 2 },
                LabelRun { start: 7, end: 8, motif_id: 1 },
            ]
        );
    }

    #[test]
    fn run_at_is_maximal_and_local() {
        let labels = [3, 3, 0, 3, 3, 3, 0];
        assert_eq!(run_at(&labels, 4), Some(LabelRun { start: 3, end: 6, motif_id: 3 }));
        assert_eq!(run_at(&labels, 0), Some(LabelRun { start: 0, end: 2, motif_id: 3 }));
        assert_eq!(run_at(&labels, 2), Some(LabelRun { start: 2, end: 3, motif_id: 0 }));
        assert_eq!(run_at(&labels, 7), None);
    }

    #[test]
    fn short_runs_are_cleared() {
        let mut labels = [1, 0, 2, 2, 2, 0, 4, 4];
        let removed = remove_short_runs(&mut labels, 3);
        assert_eq!(removed, 2);
        assert_eq!(labels, [0, 0, 2, 2, 2, 0, 0, 0]);
    }
}
