//! ALAP: backward list scheduling from due dates.

use std::cmp::Reverse;

use chrono::{DateTime, Duration, Utc};

use super::graph::Dag;
use super::occupancy::Occupancy;
use super::Unsatisfiable;
use crate::model::Operation;

pub(super) fn run(
    ops: &mut [Operation],
    dag: &Dag,
    occupancy: &mut Occupancy,
    movable: &[bool],
    horizon: DateTime<Utc>,
) -> Result<(), Unsatisfiable> {
    let n = ops.len();
    // Latest currently-scheduled end, or a back-to-back run from the horizon.
    let anchor = ops.iter().filter_map(Operation::end).max().unwrap_or_else(|| {
        horizon + Duration::minutes(ops.iter().map(|o| o.duration_minutes).sum())
    });

    let mut done: Vec<bool> = movable.iter().map(|m| !m).collect();
    loop {
        // Latest deadline goes first; on ties the less urgent operation takes
        // the later slot.
        let mut best: Option<(DateTime<Utc>, u32, Reverse<usize>)> = None;
        for i in 0..n {
            if done[i] || !dag.succs[i].iter().all(|&s| done[s]) {
                continue;
            }
            let latest_end = dag.succs[i]
                .iter()
                .filter_map(|&s| ops[s].start)
                .fold(ops[i].due.unwrap_or(anchor), |a, b| a.min(b));
            let key = (latest_end, ops[i].priority.0, Reverse(i));
            if best.map_or(true, |b| key > b) {
                best = Some(key);
            }
        }
        let Some((latest_end, _, Reverse(i))) = best else { break };

        let duration = ops[i].duration();
        let start = occupancy.latest_fit(ops[i].resource_id.as_ref(), latest_end, duration);
        ops[i].start = Some(start);
        occupancy.reserve(ops[i].resource_id.as_ref(), start, start + duration);
        done[i] = true;
    }

    let stuck: Vec<usize> = (0..n).filter(|&i| !done[i]).collect();
    if !stuck.is_empty() {
        return Err(Unsatisfiable::new(stuck, "dependency cycle"));
    }

    let late: Vec<usize> = (0..n)
        .filter(|&i| movable[i] && ops[i].start.is_some_and(|s| s < horizon))
        .collect();
    if late.is_empty() {
        Ok(())
    } else {
        Err(Unsatisfiable::new(late, "due date cannot be met from the current time"))
    }
}
