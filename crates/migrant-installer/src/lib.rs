mod choco;
mod events;
mod job;
mod retry;
mod worker;

pub use choco::{
    build_install_args, extract_error_message, locate_executable, parse_limit_output,
    parse_outdated, parse_version, ChocoCatalog, DEFAULT_INSTALL_TIMEOUT,
};
pub use events::{ChannelObserver, NoopObserver, WorkerEvent, WorkerObserver};
pub use job::{Job, WorkerStats};
pub use retry::RetryPolicy;
pub use worker::{InstallWorker, InstallWorkerBuilder, SharedPlan};

#[cfg(test)]
mod tests;
