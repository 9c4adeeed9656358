pub mod operation;
pub mod resource;
pub mod schedule;
pub mod timeline;

pub use operation::{Operation, OperationId, OperationStatus, Priority, Slot};
pub use resource::{Resource, ResourceId};
pub use schedule::{Conflict, OperationFlag, ScheduleState};
pub use timeline::{Marker, TimeAxis, TimelineScale};
