//! ASAP: forward list scheduling from the horizon.

use chrono::{DateTime, Duration, Utc};

use super::graph::Dag;
use super::occupancy::Occupancy;
use super::Unsatisfiable;
use crate::model::{Operation, Priority};

/// Place every movable operation as early as its predecessors and resource allow.
///
/// Among ready operations the one with the earliest allowed start goes first;
/// ties go to the more urgent priority, then to sequence order.
pub(super) fn schedule_forward(
    ops: &mut [Operation],
    dag: &Dag,
    occupancy: &mut Occupancy,
    movable: &[bool],
    release: impl Fn(usize) -> DateTime<Utc>,
    lag: impl Fn(usize, usize) -> Duration,
) -> Result<(), Unsatisfiable> {
    let n = ops.len();
    let mut done: Vec<bool> = movable.iter().map(|m| !m).collect();

    loop {
        let mut best: Option<(DateTime<Utc>, Priority, usize)> = None;
        for i in 0..n {
            if done[i] || !dag.preds[i].iter().all(|&p| done[p]) {
                continue;
            }
            let earliest = dag.preds[i]
                .iter()
                .filter_map(|&p| ops[p].end().map(|end| end + lag(p, i)))
                .fold(release(i), |a, b| a.max(b));
            let key = (earliest, ops[i].priority, i);
            if best.map_or(true, |b| key < b) {
                best = Some(key);
            }
        }
        let Some((earliest, _, i)) = best else { break };

        let duration = ops[i].duration();
        let start = occupancy.earliest_fit(ops[i].resource_id.as_ref(), earliest, duration);
        ops[i].start = Some(start);
        occupancy.reserve(ops[i].resource_id.as_ref(), start, start + duration);
        done[i] = true;
    }

    let stuck: Vec<usize> = (0..n).filter(|&i| !done[i]).collect();
    if stuck.is_empty() {
        Ok(())
    } else {
        Err(Unsatisfiable::new(stuck, "dependency cycle"))
    }
}

pub(super) fn run(
    ops: &mut [Operation],
    dag: &Dag,
    occupancy: &mut Occupancy,
    movable: &[bool],
    horizon: DateTime<Utc>,
) -> Result<(), Unsatisfiable> {
    schedule_forward(ops, dag, occupancy, movable, |_| horizon, |_, _| Duration::zero())
}
