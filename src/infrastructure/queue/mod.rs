mod jobs;

pub use jobs::{keys, queues, JobResult, QueueJobStatus, RunCrewJob};
