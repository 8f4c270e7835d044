//! Background revalidation: periodic scheduling, the bounded task queue and retry workers.

pub mod queue;
pub mod scheduler;
pub mod task;
pub mod worker;
