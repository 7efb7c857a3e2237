//! Queue module: task records, the four-queue registry, outstanding futures
//! and the caller-side retry policy.

mod inflight;
mod record;
mod registry;
mod retry;

pub use inflight::{FuturesTable, TaskFuture};
pub use record::TaskRecord;
pub use registry::TaskRegistry;
pub use retry::RetryPolicy;
