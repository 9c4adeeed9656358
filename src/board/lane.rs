use chrono::{DateTime, Duration, Utc};

use crate::config::BoardConfig;
use crate::error::RejectReason;
use crate::model::timeline::snap;
use crate::model::{Operation, Resource, ResourceId, ScheduleState, TimeAxis};

/// One resource row: drop target and drop validation.
///
/// Purely computational. It reads the board's latest optimistic state and
/// never mutates it.
#[derive(Debug, Clone, Copy)]
pub struct ResourceLane<'a> {
    state: &'a ScheduleState,
    config: &'a BoardConfig,
    resource_id: &'a ResourceId,
}

impl<'a> ResourceLane<'a> {
    pub fn new(state: &'a ScheduleState, config: &'a BoardConfig, resource_id: &'a ResourceId) -> Self {
        Self {
            state,
            config,
            resource_id,
        }
    }

    pub fn resource_id(&self) -> &'a ResourceId {
        self.resource_id
    }

    pub fn resource(&self) -> Option<&'a Resource> {
        self.state.resource(self.resource_id)
    }

    /// Scheduled operations on this lane, by start time.
    pub fn operations(&self) -> Vec<&'a Operation> {
        self.state.lane_operations(self.resource_id)
    }

    /// Time under the pointer, rounded to the snap interval.
    pub fn compute_drop_time(&self, pointer_x: f32, axis: &TimeAxis) -> DateTime<Utc> {
        snap(axis.to_time(pointer_x), self.config.snap_minutes)
    }

    /// Whether `op` may be placed on this lane at `start` for `duration_minutes`.
    pub fn validate_drop(
        &self,
        op: &Operation,
        start: DateTime<Utc>,
        duration_minutes: i64,
    ) -> Result<(), RejectReason> {
        let end = start + Duration::minutes(duration_minutes);

        let same_lane = op.resource_id.as_ref() == Some(self.resource_id);
        if let (true, Some(origin)) = (same_lane, op.start) {
            let shift = (start - origin).num_minutes().abs();
            if duration_minutes == op.duration_minutes && shift < self.config.min_move_minutes {
                return Err(RejectReason::NoSignificantChange);
            }
        }

        let resource = self
            .resource()
            .ok_or_else(|| RejectReason::UnknownResource(self.resource_id.clone()))?;
        if !resource.is_active {
            return Err(RejectReason::InactiveResource(self.resource_id.clone()));
        }

        if let Some(hours) = &self.config.working_hours {
            if !hours.admits(start, end) {
                return Err(RejectReason::OutsideWorkingHours);
            }
        }

        if resource.is_single_occupancy() {
            if let Some(other) = self
                .state
                .occupants(self.resource_id, start, end, Some(&op.id))
                .first()
            {
                return Err(RejectReason::Overlap {
                    with: other.id.clone(),
                    name: other.name.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OperationId;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn state() -> ScheduleState {
        ScheduleState::new(
            vec![
                Operation::new("op1", "Cut", 60).on("R1").starting_at(at(9, 0)),
                Operation::new("op2", "Weld", 60).on("R1").starting_at(at(10, 0)),
            ],
            vec![
                Resource::new("R1", "Saw"),
                Resource::new("R2", "Old lathe").inactive(),
                Resource::new("Oven", "Oven").parallel(),
            ],
        )
    }

    fn op<'a>(state: &'a ScheduleState, id: &str) -> &'a Operation {
        state.operation(&OperationId::new(id)).unwrap()
    }

    #[test]
    fn drop_time_snaps_to_interval() {
        let state = state();
        let config = BoardConfig::default();
        let r1 = ResourceId::new("R1");
        let lane = ResourceLane::new(&state, &config, &r1);
        let axis = TimeAxis::layout(at(8, 0), at(18, 0), 1.0, 600.0);
        assert_eq!(lane.compute_drop_time(68.0, &axis), at(9, 15));
        assert_eq!(lane.compute_drop_time(66.0, &axis), at(9, 0));
    }

    #[test]
    fn small_shift_on_same_lane_is_a_no_op() {
        let state = state();
        let config = BoardConfig::default();
        let r1 = ResourceId::new("R1");
        let lane = ResourceLane::new(&state, &config, &r1);
        let op1 = op(&state, "op1");
        assert_eq!(
            lane.validate_drop(op1, at(9, 10), 60),
            Err(RejectReason::NoSignificantChange)
        );
        assert_eq!(
            lane.validate_drop(op1, at(8, 31), 60),
            Err(RejectReason::NoSignificantChange)
        );
        assert_eq!(lane.validate_drop(op1, at(8, 0), 60), Ok(()));
    }

    #[test]
    fn overlap_names_the_occupant() {
        let state = state();
        let config = BoardConfig::default();
        let r1 = ResourceId::new("R1");
        let lane = ResourceLane::new(&state, &config, &r1);
        let err = lane.validate_drop(op(&state, "op2"), at(9, 30), 60).unwrap_err();
        assert_eq!(
            err,
            RejectReason::Overlap {
                with: OperationId::new("op1"),
                name: "Cut".into()
            }
        );
        assert_eq!(err.to_string(), "would overlap with Cut (op1)");
    }

    #[test]
    fn inactive_and_unknown_lanes_refuse_drops() {
        let state = state();
        let config = BoardConfig::default();
        let r2 = ResourceId::new("R2");
        let missing = ResourceId::new("R7");
        let op1 = op(&state, "op1");
        assert_eq!(
            ResourceLane::new(&state, &config, &r2).validate_drop(op1, at(12, 0), 60),
            Err(RejectReason::InactiveResource(r2.clone()))
        );
        assert_eq!(
            ResourceLane::new(&state, &config, &missing).validate_drop(op1, at(12, 0), 60),
            Err(RejectReason::UnknownResource(missing.clone()))
        );
    }

    #[test]
    fn working_hours_bound_the_drop() {
        let state = state();
        let mut config = BoardConfig::default();
        let r1 = ResourceId::new("R1");
        let op1 = op(&state, "op1");
        {
            let lane = ResourceLane::new(&state, &config, &r1);
            assert_eq!(
                lane.validate_drop(op1, at(21, 30), 60),
                Err(RejectReason::OutsideWorkingHours)
            );
            assert_eq!(
                lane.validate_drop(op1, at(6, 0), 60),
                Err(RejectReason::OutsideWorkingHours)
            );
        }
        config.working_hours = None;
        let lane = ResourceLane::new(&state, &config, &r1);
        assert_eq!(lane.validate_drop(op1, at(21, 30), 60), Ok(()));
    }

    #[test]
    fn parallel_lane_accepts_overlap() {
        let state = ScheduleState::new(
            vec![
                Operation::new("a", "A", 60).on("Oven").starting_at(at(9, 0)),
                Operation::new("b", "B", 60).on("R1").starting_at(at(9, 0)),
            ],
            vec![Resource::new("R1", "Saw"), Resource::new("Oven", "Oven").parallel()],
        );
        let config = BoardConfig::default();
        let oven = ResourceId::new("Oven");
        let lane = ResourceLane::new(&state, &config, &oven);
        assert_eq!(lane.validate_drop(op(&state, "b"), at(9, 0), 60), Ok(()));
    }
}
