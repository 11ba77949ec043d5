use std::net::SocketAddr;

use thiserror::Error;

/// Errors returned by [`crate::JobSupervisor`] operations and the failure listener.
#[derive(Debug, Error)]
pub enum JobSupervisorError {
    #[error("failed to parse manifest for job '{job}': {source}")]
    Manifest {
        job: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("{context}: {source:#}")]
    Filesystem {
        context: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("{context}: {source:#}")]
    ServiceControl {
        context: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("failed to bind job failure listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
    #[error("job failure listener stopped serving: {source}")]
    Serve {
        #[source]
        source: std::io::Error,
    },
}

impl JobSupervisorError {
    pub(crate) fn filesystem(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Filesystem {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn service_control(context: impl Into<String>, source: anyhow::Error) -> Self {
        Self::ServiceControl {
            context: context.into(),
            source,
        }
    }
}
