use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::model::{Resource, ResourceId};

type Interval = (DateTime<Utc>, DateTime<Utc>);

/// Busy intervals per resource while a strategy places operations.
///
/// Unassigned operations and parallel resources are never constrained.
#[derive(Debug, Clone, Default)]
pub(crate) struct Occupancy {
    lanes: HashMap<ResourceId, Vec<Interval>>,
    parallel: HashSet<ResourceId>,
}

impl Occupancy {
    pub fn new(resources: &[Resource]) -> Self {
        Self {
            lanes: HashMap::new(),
            parallel: resources
                .iter()
                .filter(|r| r.allow_parallel)
                .map(|r| r.id.clone())
                .collect(),
        }
    }

    fn lane(&self, resource: Option<&ResourceId>) -> Option<&[Interval]> {
        let rid = resource?;
        if self.parallel.contains(rid) {
            return None;
        }
        Some(self.lanes.get(rid).map(Vec::as_slice).unwrap_or(&[]))
    }

    pub fn reserve(&mut self, resource: Option<&ResourceId>, start: DateTime<Utc>, end: DateTime<Utc>) {
        let Some(rid) = resource else { return };
        let lane = self.lanes.entry(rid.clone()).or_default();
        let at = lane.partition_point(|(s, _)| *s <= start);
        lane.insert(at, (start, end));
    }

    /// Earliest start at or after `not_before` where `duration` fits.
    pub fn earliest_fit(
        &self,
        resource: Option<&ResourceId>,
        not_before: DateTime<Utc>,
        duration: Duration,
    ) -> DateTime<Utc> {
        let Some(lane) = self.lane(resource) else { return not_before };
        let mut t = not_before;
        for &(s, e) in lane {
            if e <= t {
                continue;
            }
            if s >= t + duration {
                break;
            }
            t = t.max(e);
        }
        t
    }

    /// Latest start such that `duration` fits and ends by `not_after`.
    pub fn latest_fit(
        &self,
        resource: Option<&ResourceId>,
        not_after: DateTime<Utc>,
        duration: Duration,
    ) -> DateTime<Utc> {
        let Some(lane) = self.lane(resource) else { return not_after - duration };
        let mut end = not_after;
        for &(s, e) in lane.iter().rev() {
            if s >= end {
                continue;
            }
            if e <= end - duration {
                break;
            }
            end = end.min(s);
        }
        end - duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn busy() -> (Occupancy, ResourceId) {
        let rid = ResourceId::new("R1");
        let mut occ = Occupancy::new(&[Resource::new("R1", "Saw")]);
        occ.reserve(Some(&rid), at(9, 0), at(10, 0));
        occ.reserve(Some(&rid), at(10, 30), at(11, 0));
        (occ, rid)
    }

    #[test]
    fn earliest_fit_uses_gaps() {
        let (occ, rid) = busy();
        assert_eq!(occ.earliest_fit(Some(&rid), at(8, 0), Duration::minutes(60)), at(8, 0));
        assert_eq!(occ.earliest_fit(Some(&rid), at(8, 30), Duration::minutes(60)), at(11, 0));
        assert_eq!(occ.earliest_fit(Some(&rid), at(9, 30), Duration::minutes(30)), at(10, 0));
    }

    #[test]
    fn latest_fit_packs_backwards() {
        let (occ, rid) = busy();
        assert_eq!(occ.latest_fit(Some(&rid), at(12, 0), Duration::minutes(60)), at(11, 0));
        assert_eq!(occ.latest_fit(Some(&rid), at(11, 0), Duration::minutes(30)), at(10, 0));
        assert_eq!(occ.latest_fit(Some(&rid), at(11, 0), Duration::minutes(60)), at(8, 0));
    }

    #[test]
    fn unassigned_and_parallel_are_unconstrained() {
        let rid = ResourceId::new("Oven");
        let mut occ = Occupancy::new(&[Resource::new("Oven", "Oven").parallel()]);
        occ.reserve(Some(&rid), at(9, 0), at(10, 0));
        assert_eq!(occ.earliest_fit(Some(&rid), at(9, 0), Duration::minutes(60)), at(9, 0));
        assert_eq!(occ.earliest_fit(None, at(9, 0), Duration::minutes(60)), at(9, 0));
    }
}
