use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use super::operation::{Operation, OperationId, Slot};
use super::resource::{Resource, ResourceId};

/// Why an operation is highlighted without being moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum OperationFlag {
    /// Assigned to a resource that is not active.
    InactiveResource,
    /// Assigned to a resource missing from the resource snapshot.
    UnknownResource,
}

/// A pair of operations whose intervals intersect on a single-occupancy resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    pub resource_id: ResourceId,
    pub first: OperationId,
    pub second: OperationId,
}

/// The board's in-memory aggregate of operations and resources.
///
/// Built fresh from a backend snapshot and mutated in place by drag commits
/// and algorithm runs. Built with ordered maps so that loading the same
/// snapshot twice yields equal states.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScheduleState {
    operations: BTreeMap<OperationId, Operation>,
    resources: BTreeMap<ResourceId, Resource>,
    /// Resource row order as delivered by the backend.
    resource_order: Vec<ResourceId>,
    /// Current, possibly client-reordered, sequence.
    ordered: Vec<OperationId>,
    /// Scheduled operations per resource, sorted by start time.
    resource_index: BTreeMap<ResourceId, Vec<OperationId>>,
    dirty: BTreeSet<OperationId>,
}

impl ScheduleState {
    pub fn new(operations: Vec<Operation>, resources: Vec<Resource>) -> Self {
        let resource_order = resources.iter().map(|r| r.id.clone()).collect();
        let resources = resources.into_iter().map(|r| (r.id.clone(), r)).collect();

        // Snapshot order, with scheduled operations sorted by start time.
        let mut sorted: Vec<&Operation> = operations.iter().collect();
        sorted.sort_by(|a, b| match (a.start, b.start) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        let ordered = sorted.iter().map(|o| o.id.clone()).collect();

        let mut state = Self {
            operations: operations.into_iter().map(|o| (o.id.clone(), o)).collect(),
            resources,
            resource_order,
            ordered,
            resource_index: BTreeMap::new(),
            dirty: BTreeSet::new(),
        };
        state.reindex();
        state
    }

    // ── Reads ───────────────────────────────────────────────────

    pub fn operation(&self, id: &OperationId) -> Option<&Operation> {
        self.operations.get(id)
    }

    pub fn resource(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.get(id)
    }

    /// Operations in the current sequence order.
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.ordered.iter().filter_map(|id| self.operations.get(id))
    }

    /// Resources in row order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resource_order
            .iter()
            .filter_map(|id| self.resources.get(id))
    }

    pub fn ordered_ids(&self) -> &[OperationId] {
        &self.ordered
    }

    pub fn operation_count(&self) -> usize {
        self.operations.len()
    }

    /// Scheduled operation ids on `resource`, sorted by start time.
    pub fn lane(&self, resource: &ResourceId) -> &[OperationId] {
        self.resource_index
            .get(resource)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every non-empty lane, keyed by resource.
    pub fn lanes(&self) -> &BTreeMap<ResourceId, Vec<OperationId>> {
        &self.resource_index
    }

    pub fn lane_operations(&self, resource: &ResourceId) -> Vec<&Operation> {
        self.lane(resource)
            .iter()
            .filter_map(|id| self.operations.get(id))
            .collect()
    }

    /// Operations without a start time, in sequence order.
    pub fn unscheduled(&self) -> Vec<&Operation> {
        self.operations().filter(|o| !o.is_scheduled()).collect()
    }

    pub fn is_dirty(&self, id: &OperationId) -> bool {
        self.dirty.contains(id)
    }

    pub fn dirty_ids(&self) -> impl Iterator<Item = &OperationId> {
        self.dirty.iter()
    }

    pub fn flags(&self, id: &OperationId) -> Vec<OperationFlag> {
        let Some(rid) = self.operations.get(id).and_then(|o| o.resource_id.as_ref()) else {
            return Vec::new();
        };
        match self.resources.get(rid) {
            None => vec![OperationFlag::UnknownResource],
            Some(r) if !r.is_active => vec![OperationFlag::InactiveResource],
            Some(_) => Vec::new(),
        }
    }

    /// Operations on `resource` intersecting `[start, end)`, excluding `ignore`.
    pub fn occupants(
        &self,
        resource: &ResourceId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        ignore: Option<&OperationId>,
    ) -> Vec<&Operation> {
        self.lane_operations(resource)
            .into_iter()
            .filter(|o| Some(&o.id) != ignore && o.overlaps(start, end))
            .collect()
    }

    /// Every intersecting pair on single-occupancy resources.
    pub fn conflicts(&self) -> Vec<Conflict> {
        find_conflicts(self.operations.values(), &self.resources)
    }

    /// Time span covering all scheduled operations.
    pub fn span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.operations.values().filter_map(|o| o.start).min()?;
        let end = self.operations.values().filter_map(|o| o.end()).max()?;
        Some((start, end))
    }

    // ── Mutations ───────────────────────────────────────────────

    /// Move an operation to `slot` and return its previous slot.
    pub fn place(&mut self, id: &OperationId, slot: &Slot) -> Option<Slot> {
        let op = self.operations.get_mut(id)?;
        let previous = op.slot();
        op.restore(slot);
        self.reindex();
        Some(previous)
    }

    pub fn mark_dirty(&mut self, id: &OperationId) {
        self.dirty.insert(id.clone());
    }

    pub fn clear_dirty(&mut self, id: &OperationId) {
        self.dirty.remove(id);
    }

    /// Replace the global sequence. Ids missing from `ordered` keep their
    /// relative order at the end.
    pub fn set_order(&mut self, ordered: Vec<OperationId>) {
        let listed: BTreeSet<&OperationId> = ordered.iter().collect();
        let rest: Vec<OperationId> = self
            .ordered
            .iter()
            .filter(|id| !listed.contains(id))
            .cloned()
            .collect();
        let mut next: Vec<OperationId> = ordered
            .into_iter()
            .filter(|id| self.operations.contains_key(id))
            .collect();
        next.extend(rest);
        self.ordered = next;
    }

    /// Rewrite the sequence so that the members of `lane` appear in the given
    /// order, keeping every other operation at its position.
    pub fn set_lane_order(&mut self, lane: &[OperationId]) {
        let members: BTreeSet<&OperationId> = lane.iter().collect();
        let mut replacement = lane.iter();
        let next = self
            .ordered
            .iter()
            .map(|id| {
                if members.contains(id) {
                    replacement.next().cloned().unwrap_or_else(|| id.clone())
                } else {
                    id.clone()
                }
            })
            .collect();
        self.ordered = next;
    }

    fn reindex(&mut self) {
        let mut index: BTreeMap<ResourceId, Vec<&Operation>> = BTreeMap::new();
        for op in self.operations.values() {
            if let (Some(rid), true) = (&op.resource_id, op.is_scheduled()) {
                index.entry(rid.clone()).or_default().push(op);
            }
        }
        self.resource_index = index
            .into_iter()
            .map(|(rid, mut ops)| {
                ops.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
                (rid, ops.into_iter().map(|o| o.id.clone()).collect())
            })
            .collect();
    }
}

/// Intersecting pairs among `operations` on single-occupancy resources.
///
/// Resources missing from `resources` are treated as single-occupancy.
pub fn find_conflicts<'a>(
    operations: impl IntoIterator<Item = &'a Operation>,
    resources: &BTreeMap<ResourceId, Resource>,
) -> Vec<Conflict> {
    let mut lanes: BTreeMap<&ResourceId, Vec<&Operation>> = BTreeMap::new();
    for op in operations {
        if let (Some(rid), true) = (&op.resource_id, op.is_scheduled()) {
            lanes.entry(rid).or_default().push(op);
        }
    }

    let mut conflicts = Vec::new();
    for (rid, mut ops) in lanes {
        if resources.get(rid).is_some_and(|r| r.allow_parallel) {
            continue;
        }
        ops.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.id.cmp(&b.id)));
        for (i, a) in ops.iter().enumerate() {
            let (Some(_), Some(a_end)) = (a.start, a.end()) else { continue };
            for b in &ops[i + 1..] {
                match b.start {
                    Some(b_start) if b_start < a_end => conflicts.push(Conflict {
                        resource_id: rid.clone(),
                        first: a.id.clone(),
                        second: b.id.clone(),
                    }),
                    _ => break,
                }
            }
        }
    }
    conflicts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn sample() -> ScheduleState {
        ScheduleState::new(
            vec![
                Operation::new("op2", "Drill", 60).on("R1").starting_at(at(10, 0)),
                Operation::new("op1", "Cut", 60).on("R1").starting_at(at(9, 0)),
                Operation::new("op3", "Paint", 30).on("R2"),
                Operation::new("op4", "Pack", 30).on("R9").starting_at(at(9, 0)),
            ],
            vec![Resource::new("R1", "Saw"), Resource::new("R2", "Booth").inactive()],
        )
    }

    #[test]
    fn lanes_are_sorted_by_start() {
        let state = sample();
        assert_eq!(
            state.lane(&ResourceId::new("R1")),
            [OperationId::new("op1"), OperationId::new("op2")]
        );
        assert!(state.lane(&ResourceId::new("R2")).is_empty());
    }

    #[test]
    fn same_snapshot_builds_equal_state() {
        assert_eq!(sample(), sample());
    }

    #[test]
    fn unscheduled_operations_are_listed() {
        let state = sample();
        let ids: Vec<_> = state.unscheduled().iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["op3"]);
    }

    #[test]
    fn inactive_and_unknown_resources_are_flagged() {
        let state = sample();
        assert_eq!(
            state.flags(&OperationId::new("op3")),
            [OperationFlag::InactiveResource]
        );
        assert_eq!(
            state.flags(&OperationId::new("op4")),
            [OperationFlag::UnknownResource]
        );
        assert!(state.flags(&OperationId::new("op1")).is_empty());
    }

    #[test]
    fn place_reindexes_and_returns_previous_slot() {
        let mut state = sample();
        let id = OperationId::new("op1");
        let target = Slot {
            resource_id: Some(ResourceId::new("R1")),
            start: Some(at(11, 0)),
            duration_minutes: 60,
        };
        let previous = state.place(&id, &target).unwrap();
        assert_eq!(previous.start, Some(at(9, 0)));
        assert_eq!(
            state.lane(&ResourceId::new("R1")),
            [OperationId::new("op2"), OperationId::new("op1")]
        );
    }

    #[test]
    fn conflicts_detects_overlap() {
        let mut state = sample();
        assert!(state.conflicts().is_empty());
        let target = Slot {
            resource_id: Some(ResourceId::new("R1")),
            start: Some(at(9, 30)),
            duration_minutes: 60,
        };
        state.place(&OperationId::new("op2"), &target);
        let conflicts = state.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].first, OperationId::new("op1"));
    }

    #[test]
    fn parallel_resources_never_conflict() {
        let state = ScheduleState::new(
            vec![
                Operation::new("a", "A", 60).on("R1").starting_at(at(9, 0)),
                Operation::new("b", "B", 60).on("R1").starting_at(at(9, 0)),
            ],
            vec![Resource::new("R1", "Oven").parallel()],
        );
        assert!(state.conflicts().is_empty());
    }

    #[test]
    fn set_lane_order_keeps_other_positions() {
        let mut state = ScheduleState::new(
            vec![
                Operation::new("a", "A", 60).on("R1").starting_at(at(8, 0)),
                Operation::new("x", "X", 60).on("R2").starting_at(at(8, 30)),
                Operation::new("b", "B", 60).on("R1").starting_at(at(9, 0)),
            ],
            vec![Resource::new("R1", "Saw"), Resource::new("R2", "Lathe")],
        );
        state.set_lane_order(&[OperationId::new("b"), OperationId::new("a")]);
        let ids: Vec<_> = state.ordered_ids().iter().map(|i| i.as_str()).collect();
        assert_eq!(ids, ["b", "x", "a"]);
    }
}
