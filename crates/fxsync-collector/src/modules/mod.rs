//! 동기화 모듈.

pub mod backfill;
pub mod clock;
pub mod concurrency;
pub mod cycle;
pub mod pipeline;
pub mod retry;
pub mod schedule;
pub mod status;

pub use backfill::{download_initial_history, BackfillJob};
pub use clock::{Clock, SystemClock};
pub use concurrency::{ConcurrencyScheduler, LiveSyncJob, Mode, UnitJob};
pub use cycle::{
    CycleScheduler, CycleSettings, SchedulePolicy, SchedulerState, StopReason, WaitReason,
};
pub use pipeline::{IngestError, IngestResult, IngestionPipeline};
pub use retry::{RetryDecision, RetryGovernor};
pub use schedule::{default_schedules, SmartSchedule, TimeframeSchedule};
pub use status::{collect_status, print_status, UnitStatus};
