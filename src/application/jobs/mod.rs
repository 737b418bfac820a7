mod context;
mod fanout;
mod queue;

pub use context::{JobWorkerContext, job_failed};
pub use fanout::{
    FanoutBatchJobPayload, enqueue_fanout_batch_job, execute_fanout_batch,
    process_fanout_batch_job, run_fanout_batch,
};
pub use queue::enqueue_job;
