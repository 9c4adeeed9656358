use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use crate::model::{Operation, OperationId};

/// Finish-to-start precedence graph over a slice of operations, by index.
///
/// Predecessor ids that are not in the slice are ignored.
#[derive(Debug, Clone)]
pub(crate) struct Dag {
    pub preds: Vec<Vec<usize>>,
    pub succs: Vec<Vec<usize>>,
}

impl Dag {
    pub fn new(ops: &[Operation]) -> Self {
        let index: HashMap<&OperationId, usize> =
            ops.iter().enumerate().map(|(i, o)| (&o.id, i)).collect();
        let mut preds = vec![Vec::new(); ops.len()];
        let mut succs = vec![Vec::new(); ops.len()];
        for (i, op) in ops.iter().enumerate() {
            for p in &op.predecessors {
                match index.get(p) {
                    Some(&j) if j != i => {
                        if !preds[i].contains(&j) {
                            preds[i].push(j);
                            succs[j].push(i);
                        }
                    }
                    Some(_) => {}
                    None => tracing::debug!(operation = %op.id, predecessor = %p, "ignoring unknown predecessor"),
                }
            }
        }
        Self { preds, succs }
    }

    pub fn len(&self) -> usize {
        self.preds.len()
    }

    /// Kahn's algorithm, lowest index first among ready nodes. On a cycle,
    /// returns the nodes that could not be ordered.
    pub fn topo_order(&self) -> Result<Vec<usize>, Vec<usize>> {
        let mut indegree: Vec<usize> = self.preds.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = indegree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();
        let mut order = Vec::with_capacity(self.len());
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &s in &self.succs[i] {
                indegree[s] -= 1;
                if indegree[s] == 0 {
                    ready.push(Reverse(s));
                }
            }
        }
        if order.len() == self.len() {
            Ok(order)
        } else {
            Err((0..self.len()).filter(|i| indegree[*i] > 0).collect())
        }
    }
}
