//! Scheduling, execution and regression detection for recurring
//! accessibility scans.

pub mod driver;
pub mod executor;
pub mod recurrence;
pub mod regression;
pub mod scanner;
pub mod store;
pub mod validation;

pub use driver::{BatchError, BatchSummary, CronDriver, DriverError};
pub use executor::{ExecutionOutcome, ExecutorError, ExecutorSettings, RunExecutor};
pub use recurrence::{compute_next_run, upcoming, window_key, window_key_for, CompiledRule, RecurrenceError};
pub use regression::{classify, DetectionOutcome, RegressionDetector};
pub use scanner::{DisabledScanner, HttpScanner, ScanError, Scanner};
pub use store::{
    AlertInsert, AlertStore, ClaimOutcome, MemoryStore, MonitorStore, PgStore, ScheduleStore,
    StoreError, TargetStore,
};
pub use validation::{validate_schedule_into, ValidationResult};
