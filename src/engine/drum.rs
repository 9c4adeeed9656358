//! Drum-Buffer-Rope: schedule the bottleneck first, then tie the rest to it.
//!
//! Drum operations (on active bottleneck resources) are placed in
//! priority/slack order. Upstream work is released no earlier than needed to
//! finish `buffer_before` ahead of the drum, and downstream work waits
//! `buffer_after` behind it.

use chrono::{DateTime, Duration, Utc};

use super::critical_path;
use super::forward::schedule_forward;
use super::graph::Dag;
use super::occupancy::Occupancy;
use super::Unsatisfiable;
use crate::model::{Operation, Priority};

pub(super) struct Buffers {
    pub before: Duration,
    pub after: Duration,
}

pub(super) fn run(
    ops: &mut [Operation],
    dag: &Dag,
    occupancy: &mut Occupancy,
    movable: &[bool],
    drum: &[bool],
    horizon: DateTime<Utc>,
    buffers: &Buffers,
) -> Result<(), Unsatisfiable> {
    let n = ops.len();
    let slack = critical_path::analyse(ops, dag)?;
    let order = dag
        .topo_order()
        .map_err(|members| Unsatisfiable::new(members, "dependency cycle"))?;

    let drum_lag = |p: usize, i: usize| match (drum[p], drum[i]) {
        (true, false) => buffers.after,
        (false, true) => buffers.before,
        _ => Duration::zero(),
    };

    // Drum pass. Non-drum work is estimated back to back from the horizon so
    // that a drum operation is never released ahead of its upstream chain.
    let mut placed: Vec<bool> = (0..n).map(|i| !(movable[i] && drum[i])).collect();
    loop {
        let estimate =
            estimate_finishes(ops, dag, &order, movable, drum, &placed, horizon, &drum_lag);

        let mut best: Option<(Priority, i64, DateTime<Utc>, usize)> = None;
        for i in 0..n {
            if placed[i] || !dag.preds[i].iter().all(|&p| estimate[p].is_some()) {
                continue;
            }
            let release = dag.preds[i]
                .iter()
                .filter_map(|&p| estimate[p].map(|end| end + drum_lag(p, i)))
                .fold(horizon, |a, b| a.max(b));
            let key = (ops[i].priority, slack.total(i), release, i);
            if best.map_or(true, |b| key < b) {
                best = Some(key);
            }
        }
        let Some((_, _, release, i)) = best else { break };

        let duration = ops[i].duration();
        let start = occupancy.earliest_fit(ops[i].resource_id.as_ref(), release, duration);
        ops[i].start = Some(start);
        occupancy.reserve(ops[i].resource_id.as_ref(), start, start + duration);
        placed[i] = true;
    }

    // Rope: latest finish of non-drum work so the drum is fed on time.
    let mut latest_finish: Vec<Option<DateTime<Utc>>> = vec![None; n];
    for &i in order.iter().rev() {
        if drum[i] {
            continue;
        }
        latest_finish[i] = dag.succs[i]
            .iter()
            .filter_map(|&s| {
                if drum[s] {
                    ops[s].start.map(|start| start - buffers.before)
                } else {
                    latest_finish[s].map(|finish| finish - ops[s].duration())
                }
            })
            .min();
    }

    let release: Vec<DateTime<Utc>> = (0..n)
        .map(|i| latest_finish[i].map_or(horizon, |finish| (finish - ops[i].duration()).max(horizon)))
        .collect();
    let rest: Vec<bool> = (0..n).map(|i| movable[i] && !drum[i]).collect();
    schedule_forward(ops, dag, occupancy, &rest, |i| release[i], drum_lag)
}

/// Earliest finish of each operation given the drum placements so far.
///
/// `None` means the finish depends on a drum operation not yet placed.
#[allow(clippy::too_many_arguments)]
fn estimate_finishes(
    ops: &[Operation],
    dag: &Dag,
    order: &[usize],
    movable: &[bool],
    drum: &[bool],
    placed: &[bool],
    horizon: DateTime<Utc>,
    lag: &impl Fn(usize, usize) -> Duration,
) -> Vec<Option<DateTime<Utc>>> {
    let mut estimate: Vec<Option<DateTime<Utc>>> = vec![None; ops.len()];
    for &i in order {
        estimate[i] = if !movable[i] {
            Some(ops[i].end().unwrap_or(horizon))
        } else if drum[i] {
            placed[i].then(|| ops[i].end()).flatten()
        } else {
            let mut start = Some(horizon);
            for &p in &dag.preds[i] {
                start = match (start, estimate[p]) {
                    (Some(s), Some(end)) => Some(s.max(end + lag(p, i))),
                    _ => None,
                };
            }
            start.map(|s| s + ops[i].duration())
        };
    }
    estimate
}
