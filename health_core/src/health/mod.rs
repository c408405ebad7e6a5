pub mod aggregator;
pub mod check;
pub mod engine;
pub mod entry;
pub mod exporter;
pub mod notify;
pub mod registry;
pub mod result;
pub mod scheduler;
pub mod store;


pub use aggregator::{AggregateStatus, Aggregator, OverallStatus, UnknownPolicy};
pub use check::{check_fn, Check, CheckError, CheckOutcome, FnCheck};
pub use engine::{HealthEngine, HealthEngineBuilder};
pub use entry::{CheckConfig, CheckEntry, ScheduleSettings, Severity};
pub use exporter::{CheckReport, StatusExporter, StatusReport, StatusResponse};
pub use notify::{CheckEvent, CheckListener, HealthListener, LoggingListener, NotificationHub};
pub use registry::Registry;
pub use result::{CheckResult, CheckStatus};
pub use scheduler::{ExecutionStats, Scheduler};
pub use store::{ResultSnapshot, ResultStore};
