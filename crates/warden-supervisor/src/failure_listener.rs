use std::future::IntoFuture;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};
use warden_core::FileSystem;

use crate::alert::{Alert, FailureEvent};
use crate::error::JobSupervisorError;
use crate::supervision_state::AtomicSupervisionState;

/// Callback receiving every alert raised while supervision is monitored.
pub type JobFailureHandler = Arc<dyn Fn(Alert) -> anyhow::Result<()> + Send + Sync>;

pub fn job_failure_listener_addr(port: u16) -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, port))
}

struct UnmonitoredMarker {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
}

struct FailureListenerState {
    supervision: Arc<AtomicSupervisionState>,
    unmonitored_marker: Option<UnmonitoredMarker>,
    handler: JobFailureHandler,
    dispatch_lock: Mutex<()>,
}

impl FailureListenerState {
    fn is_dispatching(&self) -> bool {
        if !self.supervision.is_monitored() {
            return false;
        }
        match &self.unmonitored_marker {
            Some(marker) => !marker.fs.file_exists(&marker.path),
            None => true,
        }
    }
}

/// Bound but not yet serving failure listener.
pub struct FailureListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: FailureListenerState,
}

/// Binds the failure listener; a port already in use yields [`JobSupervisorError::Bind`].
pub async fn bind_job_failure_listener(
    addr: SocketAddr,
    supervision: Arc<AtomicSupervisionState>,
    handler: JobFailureHandler,
) -> Result<FailureListener, JobSupervisorError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| JobSupervisorError::Bind { addr, source })?;
    let local_addr = listener
        .local_addr()
        .map_err(|source| JobSupervisorError::Bind { addr, source })?;
    Ok(FailureListener {
        listener,
        local_addr,
        state: FailureListenerState {
            supervision,
            unmonitored_marker: None,
            handler,
            dispatch_lock: Mutex::new(()),
        },
    })
}

impl FailureListener {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Also drops events while a file exists at `path`, so another process can silence this one.
    pub fn with_unmonitored_marker(mut self, fs: Arc<dyn FileSystem>, path: PathBuf) -> Self {
        self.state.unmonitored_marker = Some(UnmonitoredMarker { fs, path });
        self
    }

    /// Serves until `shutdown` fires or its sender is dropped. In-flight requests are abandoned.
    pub async fn serve(self, shutdown: oneshot::Receiver<()>) -> Result<(), JobSupervisorError> {
        info!(addr = %self.local_addr, "job failure listener started");
        let app = build_failure_listener_router(Arc::new(self.state));
        let serve = axum::serve(self.listener, app).into_future();
        tokio::select! {
            result = serve => result.map_err(|source| JobSupervisorError::Serve { source }),
            _ = shutdown => {
                info!(addr = %self.local_addr, "job failure listener stopped");
                Ok(())
            }
        }
    }
}

fn build_failure_listener_router(state: Arc<FailureListenerState>) -> Router {
    Router::new()
        .fallback(handle_failure_event)
        .with_state(state)
}

async fn handle_failure_event(
    State(state): State<Arc<FailureListenerState>>,
    body: Bytes,
) -> StatusCode {
    let event = match serde_json::from_slice::<FailureEvent>(&body) {
        Ok(event) => event,
        Err(decode_error) => {
            warn!(error = %decode_error, "job failure listener received unknown request");
            return StatusCode::BAD_REQUEST;
        }
    };

    if !state.is_dispatching() {
        debug!(process = %event.process_name, "dropping failure event while unmonitored");
        return StatusCode::ACCEPTED;
    }

    let alert = Alert::from_failure_event(event);
    dispatch_alert(&state, alert);
    StatusCode::ACCEPTED
}

fn dispatch_alert(state: &FailureListenerState, alert: Alert) {
    let _guard = match state.dispatch_lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let service = alert.service.clone();
    if let Err(handler_error) = (state.handler)(alert) {
        error!(service = %service, error = %format!("{handler_error:#}"), "job failure handler failed");
    }
}
