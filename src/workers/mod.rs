pub mod scheduler;

pub use scheduler::{ScheduledPurchaseWorker, SchedulerConfig};
