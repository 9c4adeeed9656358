use chrono::{DateTime, Duration, Utc};

use super::lane::ResourceLane;
use crate::config::BoardConfig;
use crate::error::RejectReason;
use crate::model::timeline::snap;
use crate::model::{OperationId, ResourceId, ScheduleState, Slot, TimeAxis};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragMode {
    /// Move the block in time and, optionally, to another lane.
    Move,
    /// Drag the right edge to change the duration.
    ResizeEnd,
}

/// Toolkit-neutral pointer input driving the board's drag state machine.
///
/// `pointer_x` is measured from the axis origin. `lane` is the resource row
/// under the pointer, or `None` outside every lane.
#[derive(Debug, Clone, PartialEq)]
pub enum PointerGesture {
    Start {
        operation: OperationId,
        pointer_x: f32,
        mode: DragMode,
    },
    Move {
        pointer_x: f32,
        lane: Option<ResourceId>,
    },
    End {
        pointer_x: f32,
        lane: Option<ResourceId>,
    },
    Cancel,
}

/// Where the dragged operation would land, and whether it may.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DropPreview {
    pub resource_id: ResourceId,
    pub proposed_start: DateTime<Utc>,
    pub duration_minutes: i64,
    pub verdict: Result<(), RejectReason>,
}

impl DropPreview {
    pub fn proposed_end(&self) -> DateTime<Utc> {
        self.proposed_start + Duration::minutes(self.duration_minutes)
    }

    pub fn slot(&self) -> Slot {
        Slot {
            resource_id: Some(self.resource_id.clone()),
            start: Some(self.proposed_start),
            duration_minutes: self.duration_minutes,
        }
    }
}

/// Exists only between a drag start and its drop or cancel.
#[derive(Debug, Clone, PartialEq)]
pub struct DragContext {
    pub operation_id: OperationId,
    pub mode: DragMode,
    /// Placement before the drag; `start` is `None` when dragged from the tray.
    pub origin: Slot,
    /// Pointer position relative to the block's start when grabbed.
    grab_offset: Duration,
    pub preview: Option<DropPreview>,
}

impl DragContext {
    pub fn new(
        operation_id: OperationId,
        mode: DragMode,
        origin: Slot,
        pointer_x: f32,
        axis: &TimeAxis,
    ) -> Self {
        let grab_offset = origin
            .start
            .map(|start| axis.to_time(pointer_x) - start)
            .unwrap_or_else(Duration::zero);
        Self {
            operation_id,
            mode,
            origin,
            grab_offset,
            preview: None,
        }
    }

    pub fn origin_resource(&self) -> Option<&ResourceId> {
        self.origin.resource_id.as_ref()
    }

    pub fn origin_start(&self) -> Option<DateTime<Utc>> {
        self.origin.start
    }

    /// Recompute the preview for the pointer position. Never mutates `state`.
    pub fn hover(
        &mut self,
        pointer_x: f32,
        lane: Option<&ResourceId>,
        axis: &TimeAxis,
        state: &ScheduleState,
        config: &BoardConfig,
    ) -> Option<&DropPreview> {
        self.preview = self.propose(pointer_x, lane, axis, state, config);
        self.preview.as_ref()
    }

    fn propose(
        &self,
        pointer_x: f32,
        lane: Option<&ResourceId>,
        axis: &TimeAxis,
        state: &ScheduleState,
        config: &BoardConfig,
    ) -> Option<DropPreview> {
        let op = state.operation(&self.operation_id)?;
        match self.mode {
            DragMode::Move => {
                let resource_id = lane?.clone();
                let lane = ResourceLane::new(state, config, &resource_id);
                let proposed_start = snap(axis.to_time(pointer_x) - self.grab_offset, config.snap_minutes);
                let duration_minutes = self.origin.duration_minutes;
                let verdict = lane.validate_drop(op, proposed_start, duration_minutes);
                Some(DropPreview {
                    resource_id,
                    proposed_start,
                    duration_minutes,
                    verdict,
                })
            }
            DragMode::ResizeEnd => {
                // Resizing stays on the origin lane whatever row the pointer is over.
                let resource_id = self.origin.resource_id.clone()?;
                let proposed_start = self.origin.start?;
                let lane = ResourceLane::new(state, config, &resource_id);
                let end = lane.compute_drop_time(pointer_x, axis);
                let duration_minutes = (end - proposed_start)
                    .num_minutes()
                    .max(config.snap_minutes.max(1));
                let verdict = lane.validate_drop(op, proposed_start, duration_minutes);
                Some(DropPreview {
                    resource_id,
                    proposed_start,
                    duration_minutes,
                    verdict,
                })
            }
        }
    }
}
