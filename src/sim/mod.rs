/// Routing descriptors and their validation.
pub mod architecture;
pub mod engine;
/// Heater events and their priority rule.
pub mod event;
pub mod fixpoint;
pub mod mailbox;
pub mod model;
/// Real-time clock adapter and threaded runner.
pub mod realtime;
pub mod report;
pub mod time;
pub mod types;
/// Continuous variables and the store that owns them.
pub mod variable;

pub use architecture::Architecture;
pub use engine::{RunOutcome, Simulator};
pub use event::{Event, EventKind, EventType};
pub use realtime::{RealTimeClock, RealTimeRunner, RunHandle};
pub use report::FinalReport;
pub use time::SimTime;
pub use types::{ModelUri, OwnerFields, RunParameters, SimulationMode, VariableId};
