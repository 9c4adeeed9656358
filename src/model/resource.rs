use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ResourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A capacity unit operations are scheduled onto: machine, line, work center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub name: String,
    /// Free-form category ("machine", "work_center", ...). Lanes are grouped by it.
    pub kind: String,
    /// Drum resource for the Theory-of-Constraints strategy.
    pub is_bottleneck: bool,
    pub is_active: bool,
    /// Multi-slot resource; overlapping operations are allowed.
    #[serde(default)]
    pub allow_parallel: bool,
}

impl Resource {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(id),
            name: name.into(),
            kind: "default".to_string(),
            is_bottleneck: false,
            is_active: true,
            allow_parallel: false,
        }
    }

    pub fn bottleneck(mut self) -> Self {
        self.is_bottleneck = true;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn parallel(mut self) -> Self {
        self.allow_parallel = true;
        self
    }

    /// Whether two operations on this resource may not intersect in time.
    pub fn is_single_occupancy(&self) -> bool {
        !self.allow_parallel
    }
}
