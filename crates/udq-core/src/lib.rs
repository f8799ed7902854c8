pub mod config;
pub mod logging;

pub mod archive;
pub mod control;
pub mod events;
pub mod job;
pub mod manager;
pub mod stats;
pub mod store;
pub mod transfer;

pub use archive::{ArchiveRecord, ArchiveSink, JsonLinesArchive, MemoryArchive};
pub use events::Subscription;
pub use job::{DownloadJob, JobId, JobStatus, NewJob};
pub use manager::{QueueManager, QueueManagerBuilder, SchedulerHandle};
pub use stats::StatsSnapshot;
pub use store::{FileKv, KvStore, MemoryKv, QueueSnapshot};
pub use transfer::{HttpTransfer, SimulatedTransfer, TransferExecutor};
