//! Job supervision for the Warden agent.
//!
//! [`JobSupervisor`] turns job manifests into native services, drives their
//! lifecycle through a [`warden_service::ServiceControl`] backend, and runs the
//! local failure listener that converts process exit reports into [`Alert`]s.

pub mod alert;
pub mod error;
pub mod failure_listener;
pub mod job_supervisor;
pub mod supervision_state;

pub use alert::{
    Alert, FailureEvent, ALERT_ACTION_START, ALERT_DATE_FORMAT, PROCESS_FAILED_EVENT,
};
pub use error::JobSupervisorError;
pub use failure_listener::{
    bind_job_failure_listener, job_failure_listener_addr, FailureListener, JobFailureHandler,
};
pub use job_supervisor::{
    JobStatus, JobSupervisor, JobSupervisorConfig, ProcessInfo, DEFAULT_HOST_ADDRESS,
    DEFAULT_JOB_FAILURES_PORT, STOPPED_MARKER_FILE_NAME,
};
pub use supervision_state::{AtomicSupervisionState, SupervisionState};
