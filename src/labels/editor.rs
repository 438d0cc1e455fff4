use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::snap::snap_to_changepoint;
use super::state::{CommittedSegment, EditorState, EditorStatus, SelectedRun};
use crate::dataset::{
    frame_to_time, remove_short_runs, run_at, time_to_frame, Dataset, LabelRun, TrialId,
};
use crate::error::{AnnotatorError, AnnotatorResult};
use crate::events::{AppEvent, EventBus};
use crate::motifs::{MotifId, MotifLibrary, BACKGROUND_MOTIF};
use crate::state::Selection;
use crate::log_warn;

pub const DEFAULT_SNAP_WINDOW_SECS: f64 = 0.2;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EditorConfig {
    pub snap_enabled: bool,
    pub snap_window_secs: f64,
    /// Keep label mode on after a commit instead of disarming.
    pub stay_armed: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            snap_enabled: true,
            snap_window_secs: DEFAULT_SNAP_WINDOW_SECS,
            stay_armed: false,
        }
    }
}

/// What the dispatch thread lends the editor for one operation.
pub struct EditContext<'a> {
    pub dataset: &'a mut dyn Dataset,
    pub selection: &'a Selection,
    pub bus: &'a EventBus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    StartChosen { time: f64 },
    Committed(CommittedSegment),
    RunSelected(SelectedRun),
    SelectionCleared,
}

/// Interactive creation, editing and deletion of labeled segments.
#[derive(Debug, Default)]
pub struct LabelEditor {
    state: EditorState,
    config: EditorConfig,
}

impl LabelEditor {
    pub fn new(config: EditorConfig) -> Self {
        Self {
            state: EditorState::default(),
            config,
        }
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn status(&self) -> EditorStatus {
        self.state.status
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn set_snap_enabled(&mut self, enabled: bool) {
        self.config.snap_enabled = enabled;
    }

    pub fn set_label_mode(&mut self, enabled: bool) {
        if !enabled {
            self.cancel();
        }
        self.state.label_mode = enabled;
    }

    pub fn select_motif(&mut self, id: MotifId, motifs: &MotifLibrary) -> AnnotatorResult<()> {
        if id == BACKGROUND_MOTIF || !motifs.contains(id) {
            return Err(AnnotatorError::validation(format!("unknown motif {id}")));
        }
        self.state.selected_motif = Some(id);
        Ok(())
    }

    /// Select `id` and arm label mode, as a motif shortcut key does. A pending
    /// start survives; the motif in effect at the second click is recorded.
    pub fn activate_motif(&mut self, id: MotifId, motifs: &MotifLibrary) -> AnnotatorResult<()> {
        self.select_motif(id, motifs)?;
        self.state.label_mode = true;
        debug!("motif {id} armed");
        Ok(())
    }

    /// Drop a pending start and any edit in progress. Returns whether there was
    /// anything to drop.
    pub fn cancel(&mut self) -> bool {
        let had_pending = self.state.status == EditorStatus::AwaitingEnd || self.state.editing;
        self.state.status = EditorStatus::Idle;
        self.state.pending_start = None;
        self.state.editing = false;
        had_pending
    }

    pub fn on_trial_changed(&mut self) {
        if self.cancel() {
            debug!("pending segment discarded on trial change");
        }
        self.state.selected_run = None;
    }

    pub fn clear_selected_run(&mut self) {
        self.state.selected_run = None;
    }

    pub fn on_click(&mut self, time: f64, ctx: &mut EditContext<'_>) -> AnnotatorResult<ClickOutcome> {
        let target = Target::resolve(ctx)?;
        let frame = target.check_time(time)?;

        if !self.state.label_mode {
            return Ok(self.select_run_at(frame, &target, ctx));
        }
        if self.state.selected_motif.is_none() {
            return Err(AnnotatorError::validation("select a motif before labeling"));
        }

        let candidate = self.snap(time, &target, ctx)?;
        match self.state.status {
            EditorStatus::Idle | EditorStatus::Committing => {
                self.state.pending_start = Some(candidate);
                self.state.status = EditorStatus::AwaitingEnd;
                debug!("segment start at {candidate:.3}s");
                Ok(ClickOutcome::StartChosen { time: candidate })
            }
            EditorStatus::AwaitingEnd => {
                let start = self.state.pending_start.unwrap_or(candidate);
                self.commit(start, candidate, &target, ctx)
                    .map(ClickOutcome::Committed)
            }
        }
    }

    /// Select the labeled run under `time` without touching a pending segment.
    pub fn select_at(&mut self, time: f64, ctx: &mut EditContext<'_>) -> AnnotatorResult<ClickOutcome> {
        let target = Target::resolve(ctx)?;
        let frame = target.check_time(time)?;
        Ok(self.select_run_at(frame, &target, ctx))
    }

    /// Clear the maximal run of the motif under `cursor_time`.
    pub fn delete_at(&mut self, cursor_time: f64, ctx: &mut EditContext<'_>) -> AnnotatorResult<LabelRun> {
        if self.state.status != EditorStatus::Idle {
            return Err(AnnotatorError::validation(
                "finish or cancel the pending segment before deleting",
            ));
        }
        let target = Target::resolve(ctx)?;
        let frame = target.check_time(cursor_time)?;
        self.delete_run_containing(frame, &target, ctx)
    }

    pub fn delete_selected(&mut self, ctx: &mut EditContext<'_>) -> AnnotatorResult<LabelRun> {
        let run = self
            .state
            .selected_run
            .clone()
            .ok_or_else(|| AnnotatorError::validation("no labeled segment selected"))?;
        let target = Target::resolve(ctx)?;
        if !target.owns(&run) {
            self.state.selected_run = None;
            return Err(AnnotatorError::validation(
                "selected segment belongs to another trial or keypoint",
            ));
        }
        self.delete_run_containing(run.start_frame, &target, ctx)
    }

    /// Start replacing the selected run: the next two clicks give the new range.
    pub fn begin_edit(&mut self) -> AnnotatorResult<()> {
        let run = self
            .state
            .selected_run
            .as_ref()
            .ok_or_else(|| AnnotatorError::validation("no labeled segment selected"))?;
        if self.state.selected_motif.is_none() {
            self.state.selected_motif = Some(run.motif_id);
        }
        self.state.editing = true;
        self.state.label_mode = true;
        self.state.status = EditorStatus::Idle;
        self.state.pending_start = None;
        Ok(())
    }

    /// Time range of the selected run.
    pub fn selected_range(&self, fps: f64) -> Option<(f64, f64)> {
        self.state
            .selected_run
            .as_ref()
            .map(|run| (run.start_time(fps), run.end_time(fps)))
    }

    /// Clear runs shorter than `min_len` frames on the active trial and keypoint.
    pub fn remove_short_runs(&mut self, min_len: usize, ctx: &mut EditContext<'_>) -> AnnotatorResult<usize> {
        let target = Target::resolve(ctx)?;
        let labels = ctx.dataset.labels_mut(target.trial, &target.keypoint)?;
        let before = labels.to_vec();
        let removed = remove_short_runs(labels, min_len);
        if removed == 0 {
            return Ok(0);
        }

        let first = before.iter().zip(labels.iter()).position(|(a, b)| a != b);
        let last = before.iter().zip(labels.iter()).rposition(|(a, b)| a != b);
        if let (Some(first), Some(last)) = (first, last) {
            ctx.bus.emit(AppEvent::LabelsUpdated {
                trial: target.trial,
                keypoint: target.keypoint.clone(),
                start_frame: first,
                end_frame: last + 1,
            });
        }
        self.state.selected_run = None;
        Ok(removed)
    }

    fn snap(&self, time: f64, target: &Target, ctx: &EditContext<'_>) -> AnnotatorResult<f64> {
        if !self.config.snap_enabled {
            return Ok(time);
        }
        // Snapping never blocks a click; without changepoints the raw time stands.
        match ctx.dataset.changepoints(target.trial, &target.keypoint) {
            Ok(changepoints) => Ok(snap_to_changepoint(
                time,
                changepoints,
                target.fps,
                self.config.snap_window_secs,
            )),
            Err(err) => {
                log_warn!(
                    "no changepoints for trial {} keypoint {}, not snapping: {err}",
                    target.trial,
                    target.keypoint
                );
                Ok(time)
            }
        }
    }

    fn commit(
        &mut self,
        start: f64,
        end: f64,
        target: &Target,
        ctx: &mut EditContext<'_>,
    ) -> AnnotatorResult<CommittedSegment> {
        self.state.status = EditorStatus::Committing;
        let result = self.write_segment(start, end, target, ctx);

        self.state.status = EditorStatus::Idle;
        self.state.pending_start = None;
        if result.is_ok() {
            self.state.editing = false;
            self.state.selected_run = None;
            if !self.config.stay_armed {
                self.state.label_mode = false;
            }
        }
        result
    }

    fn write_segment(
        &mut self,
        start: f64,
        end: f64,
        target: &Target,
        ctx: &mut EditContext<'_>,
    ) -> AnnotatorResult<CommittedSegment> {
        let (start, end) = if end < start { (end, start) } else { (start, end) };
        let motif_id = self
            .state
            .selected_motif
            .ok_or_else(|| AnnotatorError::validation("select a motif before labeling"))?;

        let start_frame = target.clamp_frame(time_to_frame(start, target.fps));
        let end_frame = target.clamp_frame(time_to_frame(end, target.fps));
        if end_frame <= start_frame {
            return Err(AnnotatorError::validation(format!(
                "segment [{start:.3}s, {end:.3}s) is empty"
            )));
        }

        let replaced = if self.state.editing {
            self.state
                .selected_run
                .clone()
                .filter(|run| target.owns(run))
        } else {
            None
        };

        let labels = ctx.dataset.labels_mut(target.trial, &target.keypoint)?;
        let (mut lo, mut hi) = (start_frame, end_frame);
        if let Some(old) = &replaced {
            let old_end = old.end_frame.min(labels.len());
            let old_start = old.start_frame.min(old_end);
            labels[old_start..old_end].fill(BACKGROUND_MOTIF);
            lo = lo.min(old_start);
            hi = hi.max(old_end);
        }
        labels[start_frame..end_frame].fill(motif_id);

        debug!(
            "labeled frames [{start_frame}, {end_frame}) of trial {} / {} as motif {motif_id}",
            target.trial, target.keypoint
        );
        ctx.bus.emit(AppEvent::LabelsUpdated {
            trial: target.trial,
            keypoint: target.keypoint.clone(),
            start_frame: lo,
            end_frame: hi,
        });

        Ok(CommittedSegment {
            trial: target.trial,
            keypoint: target.keypoint.clone(),
            start_time: frame_to_time(start_frame, target.fps),
            end_time: frame_to_time(end_frame, target.fps),
            start_frame,
            end_frame,
            motif_id,
        })
    }

    fn select_run_at(&mut self, frame: usize, target: &Target, ctx: &EditContext<'_>) -> ClickOutcome {
        let run = ctx
            .dataset
            .labels(target.trial, &target.keypoint)
            .ok()
            .and_then(|labels| run_at(labels, frame))
            .filter(|run| run.motif_id != BACKGROUND_MOTIF);

        match run {
            Some(run) => {
                let selected = SelectedRun {
                    trial: target.trial,
                    keypoint: target.keypoint.clone(),
                    start_frame: run.start,
                    end_frame: run.end,
                    motif_id: run.motif_id,
                };
                self.state.selected_run = Some(selected.clone());
                ClickOutcome::RunSelected(selected)
            }
            None => {
                self.state.selected_run = None;
                ClickOutcome::SelectionCleared
            }
        }
    }

    fn delete_run_containing(
        &mut self,
        frame: usize,
        target: &Target,
        ctx: &mut EditContext<'_>,
    ) -> AnnotatorResult<LabelRun> {
        let labels = ctx.dataset.labels_mut(target.trial, &target.keypoint)?;
        let run = run_at(labels, frame)
            .filter(|run| run.motif_id != BACKGROUND_MOTIF)
            .ok_or_else(|| {
                warn!("delete requested on an unlabeled frame ({frame})");
                AnnotatorError::validation("no labeled segment at the cursor")
            })?;
        labels[run.start..run.end].fill(BACKGROUND_MOTIF);

        ctx.bus.emit(AppEvent::LabelsUpdated {
            trial: target.trial,
            keypoint: target.keypoint.clone(),
            start_frame: run.start,
            end_frame: run.end,
        });
        if self
            .state
            .selected_run
            .as_ref()
            .is_some_and(|sel| sel.start_frame < run.end && run.start < sel.end_frame)
        {
            self.state.selected_run = None;
        }
        Ok(run)
    }
}

/// Active (trial, keypoint) with the facts needed to range-check a click.
struct Target {
    trial: TrialId,
    keypoint: String,
    fps: f64,
    n_frames: usize,
}

impl Target {
    fn resolve(ctx: &EditContext<'_>) -> AnnotatorResult<Self> {
        let trial = ctx
            .selection
            .trial()
            .ok_or_else(|| AnnotatorError::validation("no trial selected"))?;
        let keypoint = ctx
            .selection
            .keypoint()
            .ok_or_else(|| AnnotatorError::validation("no keypoint selected"))?;
        Ok(Self {
            trial,
            keypoint,
            fps: ctx.dataset.fps(),
            n_frames: ctx.dataset.n_frames(trial)?,
        })
    }

    /// Frame of `time`; the end of the time axis itself is a valid click.
    fn check_time(&self, time: f64) -> AnnotatorResult<usize> {
        let frame = time_to_frame(time, self.fps);
        if !time.is_finite() || frame < 0 || frame as usize > self.n_frames {
            return Err(AnnotatorError::validation(format!(
                "time {time:.3}s is outside the trial (0 to {:.3}s)",
                frame_to_time(self.n_frames, self.fps)
            )));
        }
        Ok(frame as usize)
    }

    fn clamp_frame(&self, frame: i64) -> usize {
        frame.clamp(0, self.n_frames as i64) as usize
    }

    fn owns(&self, run: &SelectedRun) -> bool {
        run.trial == self.trial && run.keypoint == self.keypoint
    }
}
