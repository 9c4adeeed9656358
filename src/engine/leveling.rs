//! Resource leveling: push overlapping operations back, preserving order.

use std::collections::BTreeMap;

use super::graph::Dag;
use super::occupancy::Occupancy;
use super::Unsatisfiable;
use crate::model::{Operation, Resource, ResourceId};

pub(super) fn run(
    ops: &mut [Operation],
    dag: &Dag,
    resources: &BTreeMap<ResourceId, Resource>,
    movable: &[bool],
) -> Result<(), Unsatisfiable> {
    dag.topo_order()
        .map_err(|members| Unsatisfiable::new(members, "dependency cycle"))?;

    // Start times only ever move later, so this settles; the cap guards
    // against pathological interleavings of lane and dependency pushes.
    let max_passes = 4 * ops.len() + 4;
    for _ in 0..max_passes {
        let mut changed = level_lanes(ops, resources, movable);
        changed |= push_successors(ops, dag, movable);
        if !changed {
            return Ok(());
        }
    }

    let unsettled: Vec<usize> = (0..ops.len()).filter(|&i| movable[i]).collect();
    Err(Unsatisfiable::new(unsettled, "leveling did not settle"))
}

fn level_lanes(
    ops: &mut [Operation],
    resources: &BTreeMap<ResourceId, Resource>,
    movable: &[bool],
) -> bool {
    let mut lanes: BTreeMap<ResourceId, Vec<usize>> = BTreeMap::new();
    for (i, op) in ops.iter().enumerate() {
        let Some(rid) = &op.resource_id else { continue };
        if op.is_scheduled() && !resources.get(rid).is_some_and(|r| r.allow_parallel) {
            lanes.entry(rid.clone()).or_default().push(i);
        }
    }

    let mut changed = false;
    for (rid, mut lane) in lanes {
        lane.sort_by_key(|&i| (ops[i].start, i));

        let mut occupancy = Occupancy::default();
        for &i in lane.iter().filter(|&&i| !movable[i]) {
            if let (Some(s), Some(e)) = (ops[i].start, ops[i].end()) {
                occupancy.reserve(Some(&rid), s, e);
            }
        }

        let mut cursor = None;
        for &i in lane.iter().filter(|&&i| movable[i]) {
            let Some(start) = ops[i].start else { continue };
            let duration = ops[i].duration();
            let not_before = cursor.map_or(start, |c| start.max(c));
            let leveled = occupancy.earliest_fit(Some(&rid), not_before, duration);
            if leveled != start {
                ops[i].start = Some(leveled);
                changed = true;
            }
            occupancy.reserve(Some(&rid), leveled, leveled + duration);
            cursor = Some(leveled + duration);
        }
    }
    changed
}

fn push_successors(ops: &mut [Operation], dag: &Dag, movable: &[bool]) -> bool {
    let mut changed = false;
    for i in 0..ops.len() {
        if !movable[i] {
            continue;
        }
        let Some(start) = ops[i].start else { continue };
        let ready = dag.preds[i].iter().filter_map(|&p| ops[p].end()).max();
        if let Some(ready) = ready.filter(|r| *r > start) {
            ops[i].start = Some(ready);
            changed = true;
        }
    }
    changed
}
