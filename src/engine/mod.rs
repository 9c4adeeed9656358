//! Scheduling strategies.
//!
//! Every strategy is a pure transform from `(operations, resources)` to a
//! complete new schedule. Nothing is persisted here; the board commits an
//! accepted outcome through the same pipeline as a drag.
//!
//! # Rules shared by all strategies
//!
//! - Priority 1 is the most urgent; lower ordinals are placed first on ties.
//! - Fixed operations (pinned, in progress, completed) are never moved but
//!   occupy their resource.
//! - Operations on inactive or unknown resources are left untouched and
//!   reported in [`StrategyOutcome::flagged`].
//! - A result with overlapping intervals on a single-occupancy resource, or
//!   an operation starting before a predecessor ends, is rejected as
//!   [`AlgorithmInfeasible`].

mod backward;
mod critical_path;
mod drum;
mod forward;
mod graph;
mod leveling;
mod occupancy;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BoardConfig;
use crate::error::AlgorithmInfeasible;
use crate::model::schedule::find_conflicts;
use crate::model::{Operation, OperationId, Resource, ResourceId};

use graph::Dag;
use occupancy::Occupancy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    Asap,
    Alap,
    CriticalPath,
    ResourceLeveling,
    Drum,
}

impl Strategy {
    pub const ALL: [Strategy; 5] = [
        Strategy::Asap,
        Strategy::Alap,
        Strategy::CriticalPath,
        Strategy::ResourceLeveling,
        Strategy::Drum,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Asap => "ASAP",
            Strategy::Alap => "ALAP",
            Strategy::CriticalPath => "Critical Path",
            Strategy::ResourceLeveling => "Resource Leveling",
            Strategy::Drum => "Drum-Buffer-Rope",
        }
    }

    /// Whether the strategy assigns new times at all.
    pub fn reschedules(self) -> bool {
        !matches!(self, Strategy::CriticalPath)
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A complete schedule produced by one strategy run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyOutcome {
    pub strategy: Strategy,
    /// All operations, in input order, with their new placements.
    pub operations: Vec<Operation>,
    /// Operations whose placement differs from the input.
    pub changed: Vec<OperationId>,
    /// Zero-slack operations, when critical path marking is on.
    pub critical: BTreeSet<OperationId>,
    /// Operations left in place because their resource is inactive or unknown.
    pub flagged: Vec<OperationId>,
}

/// Operations a strategy could not satisfy, by index, and why.
#[derive(Debug)]
pub(crate) struct Unsatisfiable {
    members: Vec<usize>,
    reason: String,
}

impl Unsatisfiable {
    pub fn new(members: Vec<usize>, reason: impl Into<String>) -> Self {
        Self {
            members,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulingEngine {
    /// Nothing movable is placed before this instant.
    horizon: DateTime<Utc>,
    buffer_before: Duration,
    buffer_after: Duration,
    mark_critical: bool,
}

impl SchedulingEngine {
    pub fn new(horizon: DateTime<Utc>) -> Self {
        Self::from_config(&BoardConfig::default(), horizon)
    }

    pub fn from_config(config: &BoardConfig, horizon: DateTime<Utc>) -> Self {
        Self {
            horizon,
            buffer_before: Duration::minutes(config.drum_buffer_before_minutes),
            buffer_after: Duration::minutes(config.drum_buffer_after_minutes),
            mark_critical: config.mark_critical_path,
        }
    }

    pub fn with_buffers(mut self, before: Duration, after: Duration) -> Self {
        self.buffer_before = before;
        self.buffer_after = after;
        self
    }

    pub fn marking_critical(mut self, mark: bool) -> Self {
        self.mark_critical = mark;
        self
    }

    pub fn horizon(&self) -> DateTime<Utc> {
        self.horizon
    }

    pub fn apply(
        &self,
        strategy: Strategy,
        operations: &[Operation],
        resources: &[Resource],
    ) -> Result<StrategyOutcome, AlgorithmInfeasible> {
        let resource_map: BTreeMap<ResourceId, Resource> =
            resources.iter().map(|r| (r.id.clone(), r.clone())).collect();
        let mut ops = operations.to_vec();

        let flagged: Vec<bool> = ops
            .iter()
            .map(|o| {
                o.resource_id
                    .as_ref()
                    .is_some_and(|rid| !resource_map.get(rid).is_some_and(|r| r.is_active))
            })
            .collect();
        let movable: Vec<bool> = ops
            .iter()
            .zip(&flagged)
            .map(|(o, flagged)| o.resource_id.is_some() && !o.is_fixed() && !flagged)
            .collect();

        let dag = Dag::new(&ops);
        let mut occupancy = Occupancy::new(resources);
        for (op, _) in ops.iter().zip(&movable).filter(|(_, m)| !**m) {
            if let (Some(start), Some(end)) = (op.start, op.end()) {
                occupancy.reserve(op.resource_id.as_ref(), start, end);
            }
        }

        let run = match strategy {
            Strategy::Asap => forward::run(&mut ops, &dag, &mut occupancy, &movable, self.horizon),
            Strategy::Alap => backward::run(&mut ops, &dag, &mut occupancy, &movable, self.horizon),
            Strategy::CriticalPath => critical_path::analyse(&ops, &dag).map(|_| ()),
            Strategy::ResourceLeveling => leveling::run(&mut ops, &dag, &resource_map, &movable),
            Strategy::Drum => {
                let drum: Vec<bool> = ops
                    .iter()
                    .map(|o| {
                        o.resource_id
                            .as_ref()
                            .and_then(|rid| resource_map.get(rid))
                            .is_some_and(|r| r.is_bottleneck && r.is_active)
                    })
                    .collect();
                if drum.iter().zip(&movable).any(|(d, m)| *d && *m) {
                    let buffers = drum::Buffers {
                        before: self.buffer_before,
                        after: self.buffer_after,
                    };
                    drum::run(&mut ops, &dag, &mut occupancy, &movable, &drum, self.horizon, &buffers)
                } else {
                    tracing::debug!("no movable drum operations, scheduling forward");
                    forward::run(&mut ops, &dag, &mut occupancy, &movable, self.horizon)
                }
            }
        };

        run.and_then(|()| {
            if strategy.reschedules() {
                verify(&ops, &dag, &resource_map, &movable)
            } else {
                Ok(())
            }
        })
            .map_err(|u| {
                let infeasible = AlgorithmInfeasible {
                    strategy: strategy.name(),
                    operations: u.members.iter().map(|&i| ops[i].id.clone()).collect(),
                    reason: u.reason,
                };
                tracing::warn!(%strategy, operations = ?infeasible.operations, "{}", infeasible.reason);
                infeasible
            })?;

        let critical = if strategy == Strategy::CriticalPath || self.mark_critical {
            match critical_path::analyse(&ops, &dag) {
                Ok(slack) => (0..ops.len())
                    .filter(|&i| slack.is_critical(i))
                    .map(|i| ops[i].id.clone())
                    .collect(),
                Err(_) => BTreeSet::new(),
            }
        } else {
            BTreeSet::new()
        };

        let changed: Vec<OperationId> = ops
            .iter()
            .zip(operations)
            .filter(|(new, old)| new.slot() != old.slot())
            .map(|(new, _)| new.id.clone())
            .collect();
        let flagged: Vec<OperationId> = ops
            .iter()
            .zip(&flagged)
            .filter(|(_, f)| **f)
            .map(|(o, _)| o.id.clone())
            .collect();

        tracing::info!(
            %strategy,
            changed = changed.len(),
            critical = critical.len(),
            flagged = flagged.len(),
            "strategy applied"
        );

        Ok(StrategyOutcome {
            strategy,
            operations: ops,
            changed,
            critical,
            flagged,
        })
    }
}

/// Reject results that overlap or break finish-to-start order.
///
/// Only violations involving a movable operation count; fixed operations
/// are taken as given.
fn verify(
    ops: &[Operation],
    dag: &Dag,
    resources: &BTreeMap<ResourceId, Resource>,
    movable: &[bool],
) -> Result<(), Unsatisfiable> {
    let index: HashMap<&OperationId, usize> =
        ops.iter().enumerate().map(|(i, o)| (&o.id, i)).collect();

    let mut offending = BTreeSet::new();
    for conflict in find_conflicts(ops, resources) {
        let pair = [index.get(&conflict.first), index.get(&conflict.second)];
        if pair.iter().flatten().any(|&&i| movable[i]) {
            offending.extend(pair.into_iter().flatten().copied());
        }
    }
    if !offending.is_empty() {
        return Err(Unsatisfiable::new(
            offending.into_iter().collect(),
            "operations would overlap on a resource",
        ));
    }

    let late: Vec<usize> = (0..ops.len())
        .filter(|&i| movable[i])
        .filter(|&i| {
            ops[i].start.is_some_and(|start| {
                dag.preds[i]
                    .iter()
                    .filter_map(|&p| ops[p].end())
                    .any(|end| end > start)
            })
        })
        .collect();
    if late.is_empty() {
        Ok(())
    } else {
        Err(Unsatisfiable::new(late, "operation would start before a predecessor ends"))
    }
}
