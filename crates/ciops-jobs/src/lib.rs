//! Remote CI job triggering and completion polling against Jenkins.
//!
//! [`RemoteJobClient`] triggers parameterized jobs and discovers the number of
//! the build it just queued; [`JobStatusPoller`] waits for that build to reach
//! a terminal result under a fixed-interval, bounded-attempt policy.

pub mod build_number;
pub mod job_error;
pub mod job_status_poller;
pub mod remote_job_client;
pub mod transport_helpers;

pub use build_number::{BuildNumberResolver, LastBuildPlusOne, DEFAULT_TRIGGER_SETTLE_DELAY};
pub use job_error::JobError;
pub use job_status_poller::{
    probe_build, BuildLookup, BuildStatusSource, JobStatusPoller, PollPolicy, PollResult,
    DEFAULT_POLL_INTERVAL, DEFAULT_POLL_MAX_ATTEMPTS,
};
pub use remote_job_client::{
    pr_job_name, JenkinsInstance, JobHandle, JobTrigger, RemoteJobClient, RemoteJobClientConfig,
    TestSummary,
};
