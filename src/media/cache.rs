use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tokio_util::sync::CancellationToken;

use super::payload::{ComputeParams, Payload, PayloadKind};
use super::range::{subtract, TimeRange, UnitRange};
use super::source::SegmentSource;
use crate::dataset::TrialId;
use crate::error::{AnnotatorError, AnnotatorResult};

use crate::{log_error, log_info, log_warn};

/// 256 MiB.
pub const DEFAULT_MAX_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub trial: TrialId,
    pub kind: PayloadKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(u64);

/// Result of [`MediaCache::request`].
#[derive(Debug)]
pub enum CacheRequest {
    /// Fully covered; no work was scheduled.
    Ready(Payload),
    /// Resolves through [`MediaCache::poll`] or [`MediaCache::wait`].
    Pending(RequestId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub jobs_spawned: u64,
    pub units_computed: u64,
    pub evictions: u64,
}

#[derive(Debug)]
struct Chunk {
    range: UnitRange,
    payload: Payload,
}

#[derive(Debug)]
struct CacheEntry {
    params: ComputeParams,
    chunks: Vec<Chunk>,
    last_extended: u64,
    focus: UnitRange,
}

impl CacheEntry {
    fn new(params: ComputeParams, focus: UnitRange) -> Self {
        Self {
            params,
            chunks: Vec::new(),
            last_extended: 0,
            focus,
        }
    }

    fn ranges(&self) -> Vec<UnitRange> {
        self.chunks.iter().map(|c| c.range).collect()
    }

    fn byte_size(&self) -> usize {
        self.chunks.iter().map(|c| c.payload.byte_size()).sum()
    }

    fn covering(&self, range: &UnitRange) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.range.contains_range(range))
    }

    /// Insert the parts of `range` not yet covered, then coalesce neighbours.
    fn insert(&mut self, range: UnitRange, payload: Payload) -> AnnotatorResult<u64> {
        let mut added = 0;
        for gap in subtract(range, &self.ranges()) {
            let piece = payload.slice(gap.start - range.start, gap.len());
            added += piece.units();
            self.chunks.push(Chunk {
                range: gap,
                payload: piece,
            });
        }

        self.chunks.sort_by_key(|c| c.range.start);
        let mut merged: Vec<Chunk> = Vec::with_capacity(self.chunks.len());
        for chunk in self.chunks.drain(..) {
            match merged.last_mut() {
                Some(prev) if prev.range.end == chunk.range.start => {
                    prev.payload.append(chunk.payload)?;
                    prev.range.end = chunk.range.end;
                }
                _ => merged.push(chunk),
            }
        }
        self.chunks = merged;
        Ok(added)
    }
}

#[derive(Debug, Clone)]
struct InFlight {
    job_id: u64,
    key: EntryKey,
    params: ComputeParams,
    range: UnitRange,
}

struct PendingRequest {
    key: EntryKey,
    params: ComputeParams,
    range: UnitRange,
    source: Arc<dyn SegmentSource>,
    failure: Option<Failure>,
}

#[derive(Debug, Clone)]
enum Failure {
    Cancelled,
    Compute(String),
}

impl Failure {
    fn to_error(&self) -> AnnotatorError {
        match self {
            Failure::Cancelled => AnnotatorError::Cancelled,
            Failure::Compute(reason) => AnnotatorError::Decode(reason.clone()),
        }
    }
}

struct ComputeJob {
    job_id: u64,
    generation: u64,
    range: UnitRange,
    params: ComputeParams,
    source: Arc<dyn SegmentSource>,
    cancel: CancellationToken,
}

struct JobResult {
    job_id: u64,
    generation: u64,
    result: AnnotatorResult<Payload>,
}

enum ComputeCommand {
    Run(ComputeJob),
    Shutdown,
}

/// Bounded cache of computed audio and spectrogram segments.
///
/// Entries are keyed by trial and payload kind and remember the parameters
/// they were computed with. Only the owner thread touches the index; the
/// actual computation runs on a dedicated worker thread and results are merged
/// back in [`MediaCache::pump`] or [`MediaCache::wait`].
pub struct MediaCache {
    entries: HashMap<EntryKey, CacheEntry>,
    active_trial: Option<TrialId>,
    max_bytes: usize,
    tick: u64,
    generation: u64,
    cancel: CancellationToken,
    inflight: Vec<InFlight>,
    requests: HashMap<RequestId, PendingRequest>,
    next_job: u64,
    next_request: u64,
    stats: CacheStats,
    jobs_tx: Sender<ComputeCommand>,
    results_rx: Receiver<JobResult>,
    worker: Option<JoinHandle<()>>,
}

impl MediaCache {
    pub fn new(max_bytes: usize) -> AnnotatorResult<Self> {
        let (jobs_tx, jobs_rx) = mpsc::channel::<ComputeCommand>();
        let (results_tx, results_rx) = mpsc::channel::<JobResult>();

        let worker = thread::Builder::new()
            .name("media-compute".to_string())
            .spawn(move || compute_loop(jobs_rx, results_tx))
            .map_err(|err| AnnotatorError::io("spawning media-compute thread", err))?;

        Ok(Self {
            entries: HashMap::new(),
            active_trial: None,
            max_bytes,
            tick: 0,
            generation: 0,
            cancel: CancellationToken::new(),
            inflight: Vec::new(),
            requests: HashMap::new(),
            next_job: 0,
            next_request: 0,
            stats: CacheStats::default(),
            jobs_tx,
            results_rx,
            worker: Some(worker),
        })
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    pub fn total_bytes(&self) -> usize {
        self.entries.values().map(CacheEntry::byte_size).sum()
    }

    pub fn active_trial(&self) -> Option<TrialId> {
        self.active_trial
    }

    /// Covered unit ranges for `key`, in order.
    pub fn covered(&self, key: EntryKey) -> Vec<UnitRange> {
        self.entries
            .get(&key)
            .map(CacheEntry::ranges)
            .unwrap_or_default()
    }

    pub fn in_flight(&self) -> usize {
        self.inflight.len()
    }

    /// Drop everything and cancel outstanding work.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() || !self.inflight.is_empty() {
            log_info!("media cache cleared ({} entries)", self.entries.len());
        }
        self.entries.clear();
        self.active_trial = None;
        self.bump_generation();
    }

    /// Drop entries and work belonging to other trials.
    pub fn switch_trial(&mut self, trial: TrialId) {
        if self.active_trial == Some(trial) {
            return;
        }
        let dropped = self.entries.len();
        self.entries.retain(|key, _| key.trial == trial);
        if dropped != self.entries.len() {
            log_info!(
                "media cache dropped {} entries on switch to trial {}",
                dropped - self.entries.len(),
                trial
            );
        }
        self.active_trial = Some(trial);
        self.bump_generation();
    }

    /// Schedule whatever part of `range` is missing and return a handle.
    pub fn request(
        &mut self,
        trial: TrialId,
        range: TimeRange,
        params: ComputeParams,
        source: Arc<dyn SegmentSource>,
    ) -> AnnotatorResult<CacheRequest> {
        if source.kind() != params.kind {
            return Err(AnnotatorError::validation(format!(
                "{:?} source cannot serve {:?} requests",
                source.kind(),
                params.kind
            )));
        }

        self.switch_trial(trial);
        let key = EntryKey {
            trial,
            kind: params.kind,
        };

        if let Some(entry) = self.entries.get(&key) {
            if entry.params != params {
                log_info!("media cache params changed for {:?}; dropping entry", key);
                self.entries.remove(&key);
                self.cancel_requests_for(key);
                self.inflight
                    .retain(|job| !(job.key == key && job.params != params));
            }
        }

        let units = clamp(range.to_units(params.units_per_second()), &*source, &params);
        if units.is_empty() {
            return Err(AnnotatorError::validation(format!(
                "empty range [{:.3}, {:.3}]",
                range.start, range.end
            )));
        }

        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| CacheEntry::new(params, units));
        entry.focus = units;

        if let Some(chunk) = entry.covering(&units) {
            self.stats.hits += 1;
            return Ok(CacheRequest::Ready(
                chunk
                    .payload
                    .slice(units.start - chunk.range.start, units.len()),
            ));
        }

        self.schedule_missing(key, params, units, &source)?;

        let id = RequestId(self.next_request);
        self.next_request += 1;
        self.requests.insert(
            id,
            PendingRequest {
                key,
                params,
                range: units,
                source,
                failure: None,
            },
        );
        Ok(CacheRequest::Pending(id))
    }

    /// Merge finished jobs without blocking.
    pub fn pump(&mut self) {
        loop {
            match self.results_rx.try_recv() {
                Ok(result) => self.merge(result),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    log_error!("media compute worker is gone");
                    break;
                }
            }
        }
        self.reschedule_pending();
    }

    /// `None` while still pending. Resolved handles are forgotten.
    pub fn poll(&mut self, id: RequestId) -> Option<AnnotatorResult<Payload>> {
        self.pump();
        self.resolve(id)
    }

    /// Block until `id` resolves.
    pub fn wait(&mut self, id: RequestId) -> AnnotatorResult<Payload> {
        loop {
            self.pump();
            if let Some(result) = self.resolve(id) {
                return result;
            }
            if !self.requests.contains_key(&id) {
                return Err(AnnotatorError::validation(format!("unknown request {id:?}")));
            }
            let result = self.results_rx.recv().map_err(|_| {
                AnnotatorError::Decode("media compute worker stopped".to_string())
            })?;
            self.merge(result);
        }
    }

    pub fn get_or_compute(
        &mut self,
        trial: TrialId,
        range: TimeRange,
        params: ComputeParams,
        source: Arc<dyn SegmentSource>,
    ) -> AnnotatorResult<Payload> {
        match self.request(trial, range, params, source)? {
            CacheRequest::Ready(payload) => Ok(payload),
            CacheRequest::Pending(id) => self.wait(id),
        }
    }

    fn resolve(&mut self, id: RequestId) -> Option<AnnotatorResult<Payload>> {
        let request = self.requests.get(&id)?;
        if let Some(failure) = &request.failure {
            let err = failure.to_error();
            self.requests.remove(&id);
            return Some(Err(err));
        }

        let entry = self.entries.get(&request.key)?;
        if entry.params != request.params {
            return None;
        }
        let chunk = entry.covering(&request.range)?;
        let payload = chunk
            .payload
            .slice(request.range.start - chunk.range.start, request.range.len());
        let key = request.key;
        self.requests.remove(&id);
        // Chunks held for this request may now go.
        self.enforce_bound(key);
        Some(Ok(payload))
    }

    fn schedule_missing(
        &mut self,
        key: EntryKey,
        params: ComputeParams,
        units: UnitRange,
        source: &Arc<dyn SegmentSource>,
    ) -> AnnotatorResult<()> {
        let mut busy = self.covered(key);
        busy.extend(
            self.inflight
                .iter()
                .filter(|job| job.key == key && job.params == params)
                .map(|job| job.range),
        );

        for gap in subtract(units, &busy) {
            let job_id = self.next_job;
            self.next_job += 1;
            self.inflight.push(InFlight {
                job_id,
                key,
                params,
                range: gap,
            });
            self.stats.jobs_spawned += 1;
            self.jobs_tx
                .send(ComputeCommand::Run(ComputeJob {
                    job_id,
                    generation: self.generation,
                    range: gap,
                    params,
                    source: Arc::clone(source),
                    cancel: self.cancel.clone(),
                }))
                .map_err(|_| AnnotatorError::Decode("media compute worker stopped".to_string()))?;
        }
        Ok(())
    }

    /// Pending requests whose coverage was trimmed away get their gaps
    /// scheduled again.
    fn reschedule_pending(&mut self) {
        let work: Vec<(EntryKey, ComputeParams, UnitRange, Arc<dyn SegmentSource>)> = self
            .requests
            .values()
            .filter(|r| r.failure.is_none())
            .map(|r| (r.key, r.params, r.range, Arc::clone(&r.source)))
            .collect();

        for (key, params, range, source) in work {
            if self
                .entries
                .get(&key)
                .is_some_and(|e| e.params == params && e.covering(&range).is_some())
            {
                continue;
            }
            if let Err(err) = self.schedule_missing(key, params, range, &source) {
                log_error!("rescheduling {:?} failed: {err}", key);
            }
        }
    }

    fn merge(&mut self, result: JobResult) {
        let Some(pos) = self
            .inflight
            .iter()
            .position(|job| job.job_id == result.job_id)
        else {
            return;
        };
        let job = self.inflight.swap_remove(pos);
        if result.generation != self.generation {
            return;
        }

        let payload = match result.result {
            Ok(payload) => payload,
            Err(AnnotatorError::Cancelled) => return,
            Err(err) => {
                log_warn!("computing {:?} {:?} failed: {err}", job.key, job.range);
                let reason = err.to_string();
                for request in self.requests.values_mut() {
                    if request.key == job.key && request.range.intersect(&job.range).is_some() {
                        request.failure = Some(Failure::Compute(reason.clone()));
                    }
                }
                return;
            }
        };

        self.tick += 1;
        let tick = self.tick;
        let entry = self
            .entries
            .entry(job.key)
            .or_insert_with(|| CacheEntry::new(job.params, job.range));
        if entry.params != job.params {
            return;
        }
        match entry.insert(job.range, payload) {
            Ok(added) => {
                entry.last_extended = tick;
                self.stats.units_computed += added;
            }
            Err(err) => {
                log_error!("merging into {:?} failed: {err}", job.key);
                return;
            }
        }
        self.enforce_bound(job.key);
    }

    /// Ranges of `key` that must survive trimming: the latest request and
    /// everything still waiting to resolve.
    fn protected(&self, key: EntryKey) -> Vec<UnitRange> {
        let mut ranges: Vec<UnitRange> = self
            .requests
            .values()
            .filter(|r| r.key == key && r.failure.is_none())
            .map(|r| r.range)
            .collect();
        if let Some(entry) = self.entries.get(&key) {
            ranges.push(entry.focus);
        }
        ranges
    }

    fn has_pending(&self, key: EntryKey) -> bool {
        self.requests
            .values()
            .any(|r| r.key == key && r.failure.is_none())
    }

    fn enforce_bound(&mut self, extended: EntryKey) {
        while self.total_bytes() > self.max_bytes {
            let victim = self
                .entries
                .iter()
                .filter(|(key, _)| **key != extended && !self.has_pending(**key))
                .min_by_key(|(_, entry)| entry.last_extended)
                .map(|(key, _)| *key);
            match victim {
                Some(key) => {
                    self.entries.remove(&key);
                    self.stats.evictions += 1;
                    log_info!("media cache evicted {:?}", key);
                }
                None => break,
            }
        }

        let max_bytes = self.max_bytes;
        let protected = self.protected(extended);
        let Some(entry) = self.entries.get_mut(&extended) else {
            return;
        };
        while entry.byte_size() > max_bytes {
            let focus = entry.focus;
            let farthest = entry
                .chunks
                .iter()
                .enumerate()
                .filter(|(_, c)| protected.iter().all(|p| c.range.intersect(p).is_none()))
                .max_by_key(|(_, c)| c.range.gap_to(&focus))
                .map(|(i, _)| i);
            match farthest {
                Some(i) => {
                    let chunk = entry.chunks.remove(i);
                    self.stats.evictions += 1;
                    log_info!("media cache trimmed {:?} from {:?}", chunk.range, extended);
                }
                None => {
                    log_warn!(
                        "{:?} holds {} bytes for visible and pending ranges, above the {} byte bound",
                        extended,
                        entry.byte_size(),
                        max_bytes
                    );
                    break;
                }
            }
        }
    }

    fn cancel_requests_for(&mut self, key: EntryKey) {
        for request in self.requests.values_mut() {
            if request.key == key {
                request.failure.get_or_insert(Failure::Cancelled);
            }
        }
    }

    fn bump_generation(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
        self.generation += 1;
        self.inflight.clear();
        for request in self.requests.values_mut() {
            request.failure.get_or_insert(Failure::Cancelled);
        }
    }
}

impl Drop for MediaCache {
    fn drop(&mut self) {
        self.cancel.cancel();
        let _ = self.jobs_tx.send(ComputeCommand::Shutdown);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log_error!("media compute worker panicked");
            }
        }
    }
}

fn clamp(units: UnitRange, source: &dyn SegmentSource, params: &ComputeParams) -> UnitRange {
    let total = source.total_units(params);
    let end = units.end.min(total);
    UnitRange::new(units.start.min(end), end)
}

fn compute_loop(jobs_rx: Receiver<ComputeCommand>, results_tx: Sender<JobResult>) {
    while let Ok(command) = jobs_rx.recv() {
        let job = match command {
            ComputeCommand::Run(job) => job,
            ComputeCommand::Shutdown => break,
        };

        let result = if job.cancel.is_cancelled() {
            Err(AnnotatorError::Cancelled)
        } else {
            job.source.compute(job.range, &job.params, &job.cancel)
        };

        let sent = results_tx.send(JobResult {
            job_id: job.job_id,
            generation: job.generation,
            result,
        });
        if sent.is_err() {
            break;
        }
    }
}
