use std::collections::BTreeSet;

use super::drag::{DragMode, PointerGesture};
use crate::model::{Operation, OperationFlag, OperationId, ScheduleState, TimeAxis};

/// Width of the resize grip at a block's right edge, in pixels.
pub const HANDLE_WIDTH: f32 = 6.0;
/// Blocks are never drawn narrower than this, so they stay grabbable.
pub const MIN_BLOCK_WIDTH: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockHit {
    Body,
    ResizeHandle,
}

/// Render model for one scheduled operation on its lane.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationBlock<'a> {
    pub operation: &'a Operation,
    /// Left edge from the axis origin.
    pub x: f32,
    pub width: f32,
    /// Awaiting backend confirmation.
    pub dirty: bool,
    pub critical: bool,
    pub flags: Vec<OperationFlag>,
}

impl<'a> OperationBlock<'a> {
    /// `None` for unscheduled operations; they live in the tray instead.
    pub fn layout(
        operation: &'a Operation,
        axis: &TimeAxis,
        state: &ScheduleState,
        critical: &BTreeSet<OperationId>,
    ) -> Option<Self> {
        let start = operation.start?;
        Some(Self {
            operation,
            x: axis.to_x(start),
            width: axis.width_of(operation.duration()).max(MIN_BLOCK_WIDTH),
            dirty: state.is_dirty(&operation.id),
            critical: critical.contains(&operation.id),
            flags: state.flags(&operation.id),
        })
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn is_high_priority(&self) -> bool {
        self.operation.priority.is_high()
    }

    pub fn hit(&self, pointer_x: f32) -> Option<BlockHit> {
        if pointer_x < self.x || pointer_x > self.right() {
            None
        } else if pointer_x >= self.right() - HANDLE_WIDTH && self.width > 2.0 * HANDLE_WIDTH {
            Some(BlockHit::ResizeHandle)
        } else {
            Some(BlockHit::Body)
        }
    }

    /// The gesture a press at `pointer_x` starts, if it lands on the block.
    pub fn drag_start(&self, pointer_x: f32) -> Option<PointerGesture> {
        let mode = match self.hit(pointer_x)? {
            BlockHit::Body => DragMode::Move,
            BlockHit::ResizeHandle => DragMode::ResizeEnd,
        };
        Some(PointerGesture::Start {
            operation: self.operation.id.clone(),
            pointer_x,
            mode,
        })
    }
}
