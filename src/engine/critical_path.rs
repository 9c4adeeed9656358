//! Critical Path Method over finish-to-start dependencies.
//!
//! Resources are ignored; the critical operations are those with zero total
//! slack, i.e. the longest dependency chain(s) by total duration.

use super::graph::Dag;
use super::Unsatisfiable;
use crate::model::Operation;

/// Early and late starts in minutes from the horizon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Slack {
    pub earliest_start: Vec<i64>,
    pub latest_start: Vec<i64>,
}

impl Slack {
    pub fn total(&self, i: usize) -> i64 {
        self.latest_start[i] - self.earliest_start[i]
    }

    pub fn is_critical(&self, i: usize) -> bool {
        self.total(i) == 0
    }
}

pub(crate) fn analyse(ops: &[Operation], dag: &Dag) -> Result<Slack, Unsatisfiable> {
    let order = dag
        .topo_order()
        .map_err(|members| Unsatisfiable::new(members, "dependency cycle"))?;
    let n = ops.len();

    let mut earliest_start = vec![0i64; n];
    for &i in &order {
        earliest_start[i] = dag.preds[i]
            .iter()
            .map(|&p| earliest_start[p] + ops[p].duration_minutes)
            .max()
            .unwrap_or(0);
    }
    let project_finish = (0..n)
        .map(|i| earliest_start[i] + ops[i].duration_minutes)
        .max()
        .unwrap_or(0);

    let mut latest_start = vec![0i64; n];
    for &i in order.iter().rev() {
        let latest_finish = dag.succs[i]
            .iter()
            .map(|&s| latest_start[s])
            .min()
            .unwrap_or(project_finish);
        latest_start[i] = latest_finish - ops[i].duration_minutes;
    }

    Ok(Slack {
        earliest_start,
        latest_start,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_chain_has_zero_slack() {
        // a(60) -> b(120) -> d(30)
        // a(60) -> c(30)  -> d(30)
        let ops = vec![
            Operation::new("a", "A", 60),
            Operation::new("b", "B", 120).after("a"),
            Operation::new("c", "C", 30).after("a"),
            Operation::new("d", "D", 30).after("b").after("c"),
        ];
        let dag = Dag::new(&ops);
        let slack = analyse(&ops, &dag).unwrap();
        let critical: Vec<_> = (0..4).filter(|&i| slack.is_critical(i)).collect();
        assert_eq!(critical, [0, 1, 3]);
        assert_eq!(slack.total(2), 90);
    }

    #[test]
    fn longest_independent_operation_is_critical() {
        let ops = vec![Operation::new("a", "A", 60), Operation::new("b", "B", 90)];
        let dag = Dag::new(&ops);
        let slack = analyse(&ops, &dag).unwrap();
        assert!(!slack.is_critical(0));
        assert!(slack.is_critical(1));
    }
}
