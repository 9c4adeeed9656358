//! The schedule board: owner of the in-memory schedule and of the drag
//! lifecycle.
//!
//! ```text
//! Idle ──Start──▶ Dragging ──End(valid)──▶ Committing ──ok──▶ Idle
//!   ▲               │  │                        │
//!   └───Cancel──────┘  └─End(rejected)──▶ Idle  └─failure──▶ rollback ▶ Idle
//! ```
//!
//! Every change is applied optimistically and handed back to the caller as a
//! [`Submission`]. The caller runs it against a [`ReschedulePort`] (see
//! [`submit`]) and hands the [`Settlement`] back through
//! [`ScheduleBoard::settle`], which confirms or rolls back. [`ScheduleBoard::run`]
//! does both in one step for callers that can hold the board across an await.

mod block;
mod drag;
mod lane;

pub use block::{BlockHit, OperationBlock, HANDLE_WIDTH};
pub use drag::{DragContext, DragMode, DropPreview, PointerGesture};
pub use lane::ResourceLane;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, DurationRound, Utc};

use crate::config::BoardConfig;
use crate::engine::{SchedulingEngine, Strategy, StrategyOutcome};
use crate::error::{AlgorithmInfeasible, BoardError, CommitFailure, RejectReason, SnapshotError};
use crate::io::snapshot::{self, Snapshot};
use crate::model::timeline::{MAX_ZOOM, MIN_ZOOM};
use crate::model::{Operation, OperationId, ResourceId, ScheduleState, Slot, TimeAxis};
use crate::port::{BatchFailure, CommitRequest, ReschedulePort, SequenceRequest, SnapshotSource};

/// A user-facing outcome the host should surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Rejected {
        operation: OperationId,
        reason: RejectReason,
    },
    Committed {
        operation: OperationId,
    },
    CommitFailed {
        operation: OperationId,
        name: String,
        failure: CommitFailure,
    },
    Infeasible(AlgorithmInfeasible),
    BatchCommitted {
        count: usize,
    },
    PartialBatch {
        committed: usize,
        failed: Vec<BatchFailure>,
    },
    SequenceSaved {
        resource: ResourceId,
    },
    SequenceFailed {
        resource: ResourceId,
        failure: CommitFailure,
    },
    Loaded {
        operations: usize,
        resources: usize,
        quarantined: usize,
    },
    LoadFailed(SnapshotError),
}

impl Notice {
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Notice::Rejected { .. }
                | Notice::CommitFailed { .. }
                | Notice::Infeasible(_)
                | Notice::PartialBatch { .. }
                | Notice::SequenceFailed { .. }
                | Notice::LoadFailed(_)
        )
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Rejected { reason, .. } => write!(f, "Drop rejected: {reason}"),
            Notice::Committed { operation } => write!(f, "Rescheduled {operation}"),
            Notice::CommitFailed { name, failure, .. } => {
                write!(f, "Could not reschedule {name}: {failure}")
            }
            Notice::Infeasible(err) => write!(f, "{err}"),
            Notice::BatchCommitted { count } => write!(f, "Committed {count} operation(s)"),
            Notice::PartialBatch { committed, failed } => {
                let ids: Vec<&str> = failed.iter().map(|f| f.operation_id.as_str()).collect();
                write!(
                    f,
                    "Committed {committed}, {} failed: {}",
                    failed.len(),
                    ids.join(", ")
                )
            }
            Notice::SequenceSaved { resource } => write!(f, "Saved sequence for {resource}"),
            Notice::SequenceFailed { resource, failure } => {
                write!(f, "Could not save sequence for {resource}: {failure}")
            }
            Notice::Loaded {
                operations,
                resources,
                quarantined,
            } => {
                write!(f, "Loaded {operations} operation(s) on {resources} resource(s)")?;
                if *quarantined > 0 {
                    write!(f, ", {quarantined} record(s) quarantined")?;
                }
                Ok(())
            }
            Notice::LoadFailed(err) => write!(f, "{err}"),
        }
    }
}

/// Host callbacks. All methods default to doing nothing.
pub trait BoardObserver: Send + Sync {
    /// A move was confirmed by the backend.
    fn operation_moved(&self, _operation: &OperationId, _resource: Option<&ResourceId>, _start: DateTime<Utc>) {}

    /// The visible sequence changed, optimistically or by rollback.
    fn sequence_changed(&self, _ordered: &[OperationId]) {}

    fn notice(&self, _notice: &Notice) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Quiet;

impl BoardObserver for Quiet {}

/// A port call the board is waiting on.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Single(CommitRequest),
    Batch(Vec<CommitRequest>),
    Sequence(SequenceRequest),
}

/// The port's answer to a [`Submission`].
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    Single(Result<(), CommitFailure>),
    Batch(Result<(), Vec<BatchFailure>>),
    Sequence(Result<(), CommitFailure>),
}

/// Run `submission` against `port`, failing with `Timeout` once `limit` passes.
pub async fn submit(port: &dyn ReschedulePort, submission: Submission, limit: StdDuration) -> Settlement {
    match submission {
        Submission::Single(request) => Settlement::Single(
            tokio::time::timeout(limit, port.commit(request))
                .await
                .unwrap_or(Err(CommitFailure::Timeout(limit))),
        ),
        Submission::Batch(requests) => {
            let ids: Vec<OperationId> = requests.iter().map(|r| r.operation_id.clone()).collect();
            Settlement::Batch(
                tokio::time::timeout(limit, port.commit_batch(requests))
                    .await
                    .unwrap_or_else(|_| {
                        Err(ids
                            .into_iter()
                            .map(|operation_id| BatchFailure {
                                operation_id,
                                failure: CommitFailure::Timeout(limit),
                            })
                            .collect())
                    }),
            )
        }
        Submission::Sequence(request) => Settlement::Sequence(
            tokio::time::timeout(limit, port.commit_sequence(request))
                .await
                .unwrap_or(Err(CommitFailure::Timeout(limit))),
        ),
    }
}

/// Optimistic changes awaiting their [`Settlement`], with what to restore.
#[derive(Debug, Clone)]
enum InFlight {
    Single {
        operation: OperationId,
        previous: Slot,
    },
    Batch {
        previous: BTreeMap<OperationId, Slot>,
    },
    Sequence {
        resource: ResourceId,
        previous_order: Vec<OperationId>,
        previous: BTreeMap<OperationId, Slot>,
    },
}

#[derive(Debug, Clone)]
enum Phase {
    Idle,
    Dragging(DragContext),
    Committing(InFlight),
}

/// Observable summary of the board's state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardPhase {
    Idle,
    Dragging,
    Committing,
}

pub struct ScheduleBoard {
    state: ScheduleState,
    config: BoardConfig,
    phase: Phase,
    zoom: f32,
    /// Sequence as last confirmed by the backend.
    confirmed_order: Vec<OperationId>,
    critical: BTreeSet<OperationId>,
    port: Arc<dyn ReschedulePort>,
    observer: Arc<dyn BoardObserver>,
    last_notice: Option<Notice>,
}

impl fmt::Debug for ScheduleBoard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleBoard")
            .field("phase", &self.phase())
            .field("operations", &self.state.operation_count())
            .field("zoom", &self.zoom)
            .finish_non_exhaustive()
    }
}

impl ScheduleBoard {
    pub fn new(config: BoardConfig, port: Arc<dyn ReschedulePort>, observer: Arc<dyn BoardObserver>) -> Self {
        Self {
            state: ScheduleState::default(),
            zoom: config.default_zoom.clamp(MIN_ZOOM, MAX_ZOOM),
            config,
            phase: Phase::Idle,
            confirmed_order: Vec::new(),
            critical: BTreeSet::new(),
            port,
            observer,
            last_notice: None,
        }
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn state(&self) -> &ScheduleState {
        &self.state
    }

    pub fn config(&self) -> &BoardConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: BoardConfig) {
        self.config = config;
    }

    pub fn port(&self) -> Arc<dyn ReschedulePort> {
        Arc::clone(&self.port)
    }

    pub fn phase(&self) -> BoardPhase {
        match self.phase {
            Phase::Idle => BoardPhase::Idle,
            Phase::Dragging(_) => BoardPhase::Dragging,
            Phase::Committing(_) => BoardPhase::Committing,
        }
    }

    pub fn drag(&self) -> Option<&DragContext> {
        match &self.phase {
            Phase::Dragging(drag) => Some(drag),
            _ => None,
        }
    }

    pub fn critical(&self) -> &BTreeSet<OperationId> {
        &self.critical
    }

    pub fn last_notice(&self) -> Option<&Notice> {
        self.last_notice.as_ref()
    }

    pub fn lane<'a>(&'a self, resource: &'a ResourceId) -> ResourceLane<'a> {
        ResourceLane::new(&self.state, &self.config, resource)
    }

    pub fn blocks<'a>(&'a self, resource: &ResourceId, axis: &TimeAxis) -> Vec<OperationBlock<'a>> {
        self.state
            .lane_operations(resource)
            .into_iter()
            .filter_map(|op| OperationBlock::layout(op, axis, &self.state, &self.critical))
            .collect()
    }

    // ── View ────────────────────────────────────────────────────

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    /// Visible range: the scheduled span widened to whole hours with an hour
    /// of margin, or a working day from `fallback` when nothing is scheduled.
    pub fn view_range(&self, fallback: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let hour = Duration::hours(1);
        match self.state.span() {
            Some((start, end)) => {
                let start = start.duration_trunc(hour).unwrap_or(start) - hour;
                let end = end.duration_trunc(hour).unwrap_or(end) + hour + hour;
                (start, end)
            }
            None => {
                let start = fallback.duration_trunc(hour).unwrap_or(fallback);
                (start, start + Duration::hours(8))
            }
        }
    }

    pub fn axis(&self, pixel_width: f32, fallback: DateTime<Utc>) -> TimeAxis {
        let (start, end) = self.view_range(fallback);
        TimeAxis::layout(start, end, self.zoom, pixel_width)
    }

    // ── Snapshot ────────────────────────────────────────────────

    /// Replace the schedule with a fresh snapshot.
    pub fn install(&mut self, snapshot: Snapshot) -> Result<(), BoardError> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(BoardError::Busy);
        }
        let quarantined = snapshot.quarantined();
        let notice = Notice::Loaded {
            operations: snapshot.operations.accepted.len(),
            resources: snapshot.resources.accepted.len(),
            quarantined,
        };
        self.state = ScheduleState::new(snapshot.operations.accepted, snapshot.resources.accepted);
        self.confirmed_order = self.state.ordered_ids().to_vec();
        self.critical.clear();
        tracing::info!(
            operations = self.state.operation_count(),
            quarantined,
            "schedule loaded"
        );
        self.notify(notice);
        Ok(())
    }

    /// Fetch and install a snapshot. On a fetch failure the current schedule stays.
    pub async fn load(&mut self, source: &dyn SnapshotSource) -> Result<(), BoardError> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(BoardError::Busy);
        }
        match snapshot::fetch(source).await {
            Ok(snapshot) => self.install(snapshot),
            Err(err) => {
                tracing::warn!(error = %err, "snapshot fetch failed");
                self.notify(Notice::LoadFailed(err));
                Ok(())
            }
        }
    }

    // ── Drag lifecycle ──────────────────────────────────────────

    /// Feed one pointer gesture. A valid drop returns the submission to run.
    pub fn pointer(&mut self, gesture: PointerGesture, axis: &TimeAxis) -> Result<Option<Submission>, BoardError> {
        match gesture {
            PointerGesture::Start {
                operation,
                pointer_x,
                mode,
            } => {
                self.begin_drag(operation, pointer_x, mode, axis)?;
                Ok(None)
            }
            PointerGesture::Move { pointer_x, lane } => {
                let Phase::Dragging(drag) = &mut self.phase else {
                    return Err(BoardError::NotDragging);
                };
                drag.hover(pointer_x, lane.as_ref(), axis, &self.state, &self.config);
                Ok(None)
            }
            PointerGesture::End { pointer_x, lane } => self.end_drag(pointer_x, lane, axis),
            PointerGesture::Cancel => {
                if let Phase::Dragging(drag) = &self.phase {
                    tracing::debug!(operation = %drag.operation_id, "drag cancelled");
                    self.phase = Phase::Idle;
                }
                Ok(None)
            }
        }
    }

    fn begin_drag(
        &mut self,
        operation: OperationId,
        pointer_x: f32,
        mode: DragMode,
        axis: &TimeAxis,
    ) -> Result<(), BoardError> {
        if !matches!(self.phase, Phase::Idle) {
            tracing::debug!(operation = %operation, "drag refused while busy");
            return Err(BoardError::Busy);
        }
        let op = self
            .state
            .operation(&operation)
            .ok_or_else(|| BoardError::UnknownOperation(operation.clone()))?;
        if mode == DragMode::ResizeEnd && !op.is_scheduled() {
            return Err(BoardError::Unscheduled(operation));
        }
        tracing::debug!(operation = %operation, ?mode, "drag started");
        let drag = DragContext::new(operation, mode, op.slot(), pointer_x, axis);
        self.phase = Phase::Dragging(drag);
        Ok(())
    }

    fn end_drag(
        &mut self,
        pointer_x: f32,
        lane: Option<ResourceId>,
        axis: &TimeAxis,
    ) -> Result<Option<Submission>, BoardError> {
        let mut drag = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Dragging(drag) => drag,
            other => {
                self.phase = other;
                return Err(BoardError::NotDragging);
            }
        };
        let Some(preview) = drag
            .hover(pointer_x, lane.as_ref(), axis, &self.state, &self.config)
            .cloned()
        else {
            tracing::debug!(operation = %drag.operation_id, "dropped outside any lane");
            return Ok(None);
        };

        if let Err(reason) = preview.verdict.clone() {
            if reason.is_no_op() {
                tracing::debug!(operation = %drag.operation_id, "drop ignored, no significant change");
            } else {
                tracing::info!(operation = %drag.operation_id, %reason, "drop rejected");
                self.notify(Notice::Rejected {
                    operation: drag.operation_id,
                    reason,
                });
            }
            return Ok(None);
        }

        let operation = drag.operation_id;
        let lanes = self.state.lanes().clone();
        let Some(previous) = self.state.place(&operation, &preview.slot()) else {
            return Err(BoardError::UnknownOperation(operation));
        };
        self.resequence(&lanes);
        self.state.mark_dirty(&operation);
        let request = self
            .state
            .operation(&operation)
            .and_then(CommitRequest::for_operation)
            .ok_or_else(|| BoardError::Unscheduled(operation.clone()))?;

        tracing::info!(
            operation = %operation,
            resource = %preview.resource_id,
            start = %preview.proposed_start,
            "committing move"
        );
        self.phase = Phase::Committing(InFlight::Single { operation, previous });
        Ok(Some(Submission::Single(request)))
    }

    // ── Strategies ──────────────────────────────────────────────

    /// Run a strategy against the current schedule. The schedule itself is
    /// left untouched; commit the outcome with [`Self::commit_outcome`].
    pub fn apply_strategy(&mut self, strategy: Strategy, now: DateTime<Utc>) -> Result<StrategyOutcome, AlgorithmInfeasible> {
        let operations: Vec<Operation> = self.state.operations().cloned().collect();
        let resources: Vec<_> = self.state.resources().cloned().collect();
        let engine = SchedulingEngine::from_config(&self.config, now);
        match engine.apply(strategy, &operations, &resources) {
            Ok(outcome) => {
                if strategy == Strategy::CriticalPath || self.config.mark_critical_path {
                    self.critical = outcome.critical.clone();
                }
                Ok(outcome)
            }
            Err(err) => {
                self.notify(Notice::Infeasible(err.clone()));
                Err(err)
            }
        }
    }

    /// Optimistically apply a strategy outcome and return the batch to commit.
    ///
    /// `Ok(None)` when nothing changed. An outcome that no longer fits the
    /// current schedule is rejected whole.
    pub fn commit_outcome(&mut self, outcome: &StrategyOutcome) -> Result<Option<Submission>, BoardError> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(BoardError::Busy);
        }

        let lanes = self.state.lanes().clone();
        let mut previous = BTreeMap::new();
        for id in &outcome.changed {
            let Some(op) = outcome.operations.iter().find(|o| &o.id == id) else { continue };
            if let Some(old) = self.state.place(id, &op.slot()) {
                previous.insert(id.clone(), old);
            }
        }
        if previous.is_empty() {
            return Ok(None);
        }

        let clash = self
            .state
            .conflicts()
            .into_iter()
            .find(|c| previous.contains_key(&c.first) || previous.contains_key(&c.second));
        if let Some(clash) = clash {
            for (id, slot) in &previous {
                self.state.place(id, slot);
            }
            let (moved, other) = if previous.contains_key(&clash.first) {
                (clash.first, clash.second)
            } else {
                (clash.second, clash.first)
            };
            let name = self
                .state
                .operation(&other)
                .map(|o| o.name.clone())
                .unwrap_or_default();
            self.notify(Notice::Rejected {
                operation: moved,
                reason: RejectReason::Overlap { with: other, name },
            });
            return Ok(None);
        }

        self.resequence(&lanes);
        let requests: Vec<CommitRequest> = previous
            .keys()
            .filter_map(|id| self.state.operation(id))
            .filter_map(CommitRequest::for_operation)
            .collect();
        for id in previous.keys() {
            self.state.mark_dirty(id);
        }
        tracing::info!(strategy = %outcome.strategy, operations = requests.len(), "committing schedule");
        self.phase = Phase::Committing(InFlight::Batch { previous });
        Ok(Some(Submission::Batch(requests)))
    }

    // ── Sequencing ──────────────────────────────────────────────

    /// Move the lane entry at `from` to position `to`.
    ///
    /// When the affected run of operations is back to back, it is repacked in
    /// the new order from the run's original start. Otherwise only the
    /// sequence changes.
    pub fn reorder_lane(&mut self, resource: &ResourceId, from: usize, to: usize) -> Result<Option<Submission>, BoardError> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(BoardError::Busy);
        }
        if self.state.resource(resource).is_none() {
            return Err(BoardError::UnknownResource(resource.clone()));
        }
        let lane: Vec<Operation> = self.state.lane_operations(resource).into_iter().cloned().collect();
        for index in [from, to] {
            if index >= lane.len() {
                return Err(BoardError::OutOfRange {
                    resource: resource.clone(),
                    index,
                });
            }
        }
        if from == to {
            return Ok(None);
        }

        let mut reordered = lane.clone();
        let moved = reordered.remove(from);
        reordered.insert(to, moved);

        let (lo, hi) = (from.min(to), from.max(to));
        let chained = lane[lo..=hi].windows(2).all(|w| w[0].end() == w[1].start);

        let mut previous = BTreeMap::new();
        if chained {
            let mut cursor = lane[lo].start;
            for op in &reordered[lo..=hi] {
                let Some(start) = cursor else { break };
                if op.start != Some(start) {
                    let slot = Slot {
                        resource_id: op.resource_id.clone(),
                        start: Some(start),
                        duration_minutes: op.duration_minutes,
                    };
                    if let Some(old) = self.state.place(&op.id, &slot) {
                        previous.insert(op.id.clone(), old);
                    }
                }
                cursor = Some(start + op.duration());
            }
        }

        let previous_order = self.state.ordered_ids().to_vec();
        let ordered: Vec<OperationId> = reordered.iter().map(|o| o.id.clone()).collect();
        self.state.set_lane_order(&ordered);
        for id in previous.keys() {
            self.state.mark_dirty(id);
        }
        let moves = previous
            .keys()
            .filter_map(|id| self.state.operation(id))
            .filter_map(CommitRequest::for_operation)
            .collect();
        self.observer.sequence_changed(self.state.ordered_ids());

        tracing::info!(resource = %resource, from, to, shifted = previous.len(), "committing sequence");
        self.phase = Phase::Committing(InFlight::Sequence {
            resource: resource.clone(),
            previous_order,
            previous,
        });
        Ok(Some(Submission::Sequence(SequenceRequest {
            request_id: uuid::Uuid::new_v4(),
            resource_id: resource.clone(),
            ordered,
            moves,
        })))
    }

    /// Restore the last sequence the backend confirmed.
    pub fn reset_sequence(&mut self) -> Result<(), BoardError> {
        if !matches!(self.phase, Phase::Idle) {
            return Err(BoardError::Busy);
        }
        if self.state.ordered_ids() != self.confirmed_order.as_slice() {
            self.state.set_order(self.confirmed_order.clone());
            self.observer.sequence_changed(self.state.ordered_ids());
            tracing::debug!("sequence reset");
        }
        Ok(())
    }

    // ── Settlement ──────────────────────────────────────────────

    /// Confirm or roll back the in-flight change. Ignored when nothing is pending.
    pub fn settle(&mut self, settlement: Settlement) {
        let in_flight = match std::mem::replace(&mut self.phase, Phase::Idle) {
            Phase::Committing(in_flight) => in_flight,
            other => {
                tracing::warn!("settlement arrived with nothing in flight");
                self.phase = other;
                return;
            }
        };
        match (in_flight, settlement) {
            (InFlight::Single { operation, previous }, Settlement::Single(result)) => {
                self.settle_single(operation, previous, result)
            }
            (InFlight::Batch { previous }, Settlement::Batch(result)) => self.settle_batch(previous, result),
            (
                InFlight::Sequence {
                    resource,
                    previous_order,
                    previous,
                },
                Settlement::Sequence(result),
            ) => self.settle_sequence(resource, previous_order, previous, result),
            (in_flight, settlement) => {
                // A mismatched answer cannot confirm anything; undo.
                tracing::error!(?settlement, "settlement does not match the pending change");
                self.rollback(in_flight);
            }
        }
    }

    /// Submit and settle in one step.
    pub async fn run(&mut self, submission: Submission) {
        let port = self.port();
        let settlement = submit(port.as_ref(), submission, self.config.commit_timeout()).await;
        self.settle(settlement);
    }

    fn settle_single(&mut self, operation: OperationId, previous: Slot, result: Result<(), CommitFailure>) {
        self.state.clear_dirty(&operation);
        match result {
            Ok(()) => {
                tracing::info!(operation = %operation, "move confirmed");
                if let Some(op) = self.state.operation(&operation) {
                    if let Some(start) = op.start {
                        self.observer
                            .operation_moved(&operation, op.resource_id.as_ref(), start);
                    }
                }
                self.notify(Notice::Committed { operation });
            }
            Err(failure) => {
                tracing::warn!(operation = %operation, %failure, "move failed, rolling back");
                let lanes = self.state.lanes().clone();
                self.state.place(&operation, &previous);
                self.resequence(&lanes);
                let name = self
                    .state
                    .operation(&operation)
                    .map(|o| o.name.clone())
                    .unwrap_or_default();
                self.notify(Notice::CommitFailed {
                    operation,
                    name,
                    failure,
                });
            }
        }
    }

    fn settle_batch(&mut self, previous: BTreeMap<OperationId, Slot>, result: Result<(), Vec<BatchFailure>>) {
        let failed = result.err().unwrap_or_default();
        let failed_ids: BTreeSet<&OperationId> = failed.iter().map(|f| &f.operation_id).collect();

        let lanes = self.state.lanes().clone();
        let mut committed = 0;
        for (id, slot) in &previous {
            self.state.clear_dirty(id);
            if failed_ids.contains(id) {
                self.state.place(id, slot);
                continue;
            }
            committed += 1;
            if let Some(op) = self.state.operation(id) {
                if let Some(start) = op.start {
                    self.observer.operation_moved(id, op.resource_id.as_ref(), start);
                }
            }
        }
        self.resequence(&lanes);

        if failed.is_empty() {
            tracing::info!(committed, "schedule confirmed");
            self.notify(Notice::BatchCommitted { count: committed });
        } else {
            tracing::warn!(committed, failed = failed.len(), "schedule partially committed");
            self.notify(Notice::PartialBatch { committed, failed });
        }
    }

    fn settle_sequence(
        &mut self,
        resource: ResourceId,
        previous_order: Vec<OperationId>,
        previous: BTreeMap<OperationId, Slot>,
        result: Result<(), CommitFailure>,
    ) {
        for id in previous.keys() {
            self.state.clear_dirty(id);
        }
        match result {
            Ok(()) => {
                tracing::info!(resource = %resource, "sequence confirmed");
                self.confirmed_order = self.state.ordered_ids().to_vec();
                self.notify(Notice::SequenceSaved { resource });
            }
            Err(failure) => {
                tracing::warn!(resource = %resource, %failure, "sequence failed, rolling back");
                for (id, slot) in &previous {
                    self.state.place(id, slot);
                }
                self.state.set_order(previous_order);
                self.observer.sequence_changed(self.state.ordered_ids());
                self.notify(Notice::SequenceFailed { resource, failure });
            }
        }
    }

    fn rollback(&mut self, in_flight: InFlight) {
        let lanes = self.state.lanes().clone();
        match in_flight {
            InFlight::Single { operation, previous } => {
                self.state.clear_dirty(&operation);
                self.state.place(&operation, &previous);
                self.resequence(&lanes);
            }
            InFlight::Batch { previous } => {
                for (id, slot) in &previous {
                    self.state.clear_dirty(id);
                    self.state.place(id, slot);
                }
                self.resequence(&lanes);
            }
            InFlight::Sequence {
                previous_order,
                previous,
                ..
            } => {
                for (id, slot) in &previous {
                    self.state.clear_dirty(id);
                    self.state.place(id, slot);
                }
                self.state.set_order(previous_order);
                self.observer.sequence_changed(self.state.ordered_ids());
            }
        }
    }

    /// Bring the sequence in line with lanes re-sorted by a placement and
    /// tell the host. `before` is the lane index from before the placement.
    fn resequence(&mut self, before: &BTreeMap<ResourceId, Vec<OperationId>>) {
        let after = self.state.lanes();
        if after == before {
            return;
        }
        let changed: Vec<Vec<OperationId>> = after
            .iter()
            .filter(|(rid, lane)| before.get(*rid) != Some(*lane))
            .map(|(_, lane)| lane.clone())
            .collect();
        for lane in &changed {
            self.state.set_lane_order(lane);
        }
        tracing::debug!(lanes = changed.len(), "lane order changed");
        self.observer.sequence_changed(self.state.ordered_ids());
    }

    fn notify(&mut self, notice: Notice) {
        self.observer.notice(&notice);
        self.last_notice = Some(notice);
    }
}
