//! Stream session controller: one generation request from submit to teardown.
//!
//! A [`StreamSession`] owns everything one request needs (decoder, accumulator,
//! projector, cancellation token) and drives the read loop. Frames are folded
//! into a [`SessionState`] by an explicit reducer; the debounce timer lives in
//! the same `select!` loop, so cancelling or dropping the session can never
//! leave a projection running afterwards.
//!
//! [`SessionController`] enforces one active session at a time.

use crate::accumulator::{Accumulator, DebouncedProjector};
use crate::client::GenerationClient;
use crate::dispatch::{Dispatch, Failure};
use crate::feature::{GenerationFeature, ResultStore};
use crate::types::{ClientConfig, SessionOutcome, SessionSnapshot, SessionStatus};
use crate::{Error, Response};
use futures_util::StreamExt;
use std::marker::PhantomData;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// State of a session as folded from dispatched frames.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub status: SessionStatus,
    pub progress_step: Option<String>,
    pub artifact_token: Option<String>,
    pub failure: Option<Failure>,
    pub accumulated: Accumulator,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    /// Fresh state of a session whose body is being read.
    pub fn new() -> Self {
        Self {
            status: SessionStatus::Streaming,
            progress_step: None,
            artifact_token: None,
            failure: None,
            accumulated: Accumulator::new(),
        }
    }

    /// Apply one action. Only a streaming session changes; once a terminal
    /// action has been applied, later actions are ignored.
    pub fn reduce(mut self, action: Dispatch) -> Self {
        if self.status != SessionStatus::Streaming {
            return self;
        }

        match action {
            Dispatch::Status(step) => self.progress_step = Some(step),
            Dispatch::Set { field, value } => self.accumulated.merge(&field, value),
            Dispatch::Append { field, value } => self.accumulated.append(&field, value),
            Dispatch::Extend(map) => self.accumulated.extend(map),
            Dispatch::Complete { token, merge } => {
                if let Some(map) = merge {
                    self.accumulated.extend(map);
                }
                self.artifact_token = token;
                self.status = SessionStatus::Finalizing;
            }
            Dispatch::Fail(failure) => {
                self.failure = Some(failure);
                self.status = SessionStatus::Failed;
            }
        }
        self
    }

    /// The body ended without a terminal frame: complete if anything was
    /// generated, fail otherwise.
    pub fn end_of_stream(self, primary_list: &str) -> Self {
        if self.status != SessionStatus::Streaming {
            return self;
        }
        if self.accumulated.count(primary_list) > 0 {
            Self {
                status: SessionStatus::Finalizing,
                ..self
            }
        } else {
            self.reduce(Dispatch::Fail(Failure::Empty))
        }
    }

    pub fn cancel(mut self) -> Self {
        if !self.status.is_terminal() {
            self.status = SessionStatus::Cancelled;
        }
        self
    }
}

/// One generation request and the resources it exclusively owns.
pub struct StreamSession<F: GenerationFeature> {
    id: String,
    request: F,
    config: ClientConfig,
    cancel: CancellationToken,
    snapshots: watch::Sender<SessionSnapshot<F::View>>,
}

impl<F: GenerationFeature> StreamSession<F> {
    pub fn new(
        request: F,
        config: ClientConfig,
        cancel: CancellationToken,
        snapshots: watch::Sender<SessionSnapshot<F::View>>,
    ) -> Self {
        let id = format!("tmp-{}", uuid::Uuid::new_v4());
        // Claim the channel so late updates from an earlier session are dropped.
        snapshots.send_replace(SessionSnapshot::idle(id.clone()));
        Self {
            id,
            request,
            config,
            cancel,
            snapshots,
        }
    }

    /// Temporary id, replaced by the server id once the result is saved.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Open the upstream stream and drive it to a terminal state, saving the
    /// result through the client on completion.
    pub async fn run(self, client: &GenerationClient) -> Result<SessionOutcome<F::View>, Error> {
        let span = tracing::info_span!("session", session_id = %self.id, resource = F::RESOURCE);
        async move {
            self.publish_status(SessionStatus::Connecting, None);

            let opened = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Err(Error::Cancelled),
                opened = client.open_stream(&self.request) => opened,
            };

            let response = match opened {
                Ok(response) => response,
                Err(Error::Cancelled) => {
                    tracing::info!("cancelled while connecting");
                    self.publish_status(SessionStatus::Cancelled, None);
                    return Err(Error::Cancelled);
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to open generation stream");
                    self.publish_status(SessionStatus::Failed, Some(e.to_string()));
                    return Err(e);
                }
            };

            self.drive(response, Some(client as &dyn ResultStore)).await
        }
        .instrument(span)
        .await
    }

    /// Drive an already opened body to a terminal state.
    ///
    /// `store`, when given, receives the best-effort save on completion.
    pub async fn drive(
        self,
        response: Response,
        store: Option<&dyn ResultStore>,
    ) -> Result<SessionOutcome<F::View>, Error> {
        let profile = F::profile();
        let mut frames = response.frames(self.config.max_buffer_bytes);
        let mut state = SessionState::new();
        let mut projector = DebouncedProjector::new(self.config.debounce);
        self.publish(&state, None, &projector);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    state = state.cancel();
                    break;
                }
                _ = sleep_until(projector.deadline().unwrap_or_else(Instant::now)), if projector.is_pending() => {
                    projector.fire(|| self.request.project(&state.accumulated));
                    self.publish(&state, None, &projector);
                }
                next = frames.next() => match next {
                    Some(Ok(frame)) => {
                        let Some(action) = profile.dispatch(&frame) else {
                            continue;
                        };
                        // A frame may have been read after the token fired.
                        if self.cancel.is_cancelled() {
                            state = state.cancel();
                            break;
                        }
                        tracing::debug!(event = %frame.event_type, "applying frame");
                        let primary = action.touches(profile.primary_list);
                        state = state.reduce(action);
                        if primary {
                            projector.schedule();
                        } else {
                            projector.mark_dirty();
                        }
                        if state.status != SessionStatus::Streaming {
                            break;
                        }
                        self.publish(&state, None, &projector);
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "stream read failed");
                        state = state.reduce(Dispatch::Fail(Failure::Transport(e.to_string())));
                        break;
                    }
                    None => {
                        state = state.end_of_stream(profile.primary_list);
                        break;
                    }
                },
            }
        }
        drop(frames);

        match state.status {
            SessionStatus::Cancelled => {
                projector.cancel();
                tracing::info!(merges = state.accumulated.merges(), "session cancelled");
                self.publish(&state, None, &projector);
                Err(Error::Cancelled)
            }
            SessionStatus::Finalizing => self.finalize(state, projector, store).await,
            _ => {
                projector.flush(|| self.request.project(&state.accumulated));
                let failure = state.failure.clone().unwrap_or(Failure::Empty);
                tracing::error!(failure = %failure.message(), "session failed");
                self.publish(&state, None, &projector);
                Err(failure.into_error())
            }
        }
    }

    async fn finalize(
        self,
        mut state: SessionState,
        mut projector: DebouncedProjector<F::View>,
        store: Option<&dyn ResultStore>,
    ) -> Result<SessionOutcome<F::View>, Error> {
        let view = projector
            .flush(|| self.request.project(&state.accumulated))
            .cloned()
            .unwrap_or_else(|| self.request.project(&state.accumulated));
        self.publish(&state, None, &projector);

        let mut id = self.id.clone();
        let mut saved = false;
        let record = self
            .request
            .save_record(&state.accumulated, state.artifact_token.as_deref());
        if let (Some(store), Some(record)) = (store, record) {
            match store.save(F::RESOURCE, &record).await {
                Ok(server_id) => {
                    saved = true;
                    if let Some(server_id) = server_id {
                        id = server_id;
                    }
                    tracing::info!(id = %id, "result saved");
                }
                Err(e) => tracing::warn!(error = %e, "saving result failed"),
            }
        }

        state.status = SessionStatus::Completed;
        tracing::info!(
            token = state.artifact_token.as_deref().unwrap_or("-"),
            merges = state.accumulated.merges(),
            "session completed"
        );
        self.publish(&state, Some(id.clone()), &projector);

        Ok(SessionOutcome {
            id,
            artifact_token: state.artifact_token,
            progress_step: state.progress_step,
            view,
            accumulated: state.accumulated.to_value(),
            saved,
        })
    }

    fn publish_status(&self, status: SessionStatus, failure: Option<String>) {
        self.send_if_current(|snapshot| {
            snapshot.status = status;
            snapshot.failure = failure;
        });
    }

    fn publish(&self, state: &SessionState, id: Option<String>, projector: &DebouncedProjector<F::View>) {
        self.send_if_current(|snapshot| {
            snapshot.id = id.unwrap_or_else(|| self.id.clone());
            snapshot.status = state.status;
            snapshot.progress_step = state.progress_step.clone();
            snapshot.artifact_token = state.artifact_token.clone();
            snapshot.failure = state.failure.as_ref().map(Failure::message);
            snapshot.merges = state.accumulated.merges();
            snapshot.view = projector.latest().cloned();
        });
    }

    /// Update the snapshot unless a newer session has taken the channel over.
    fn send_if_current(&self, update: impl FnOnce(&mut SessionSnapshot<F::View>)) {
        self.snapshots.send_if_modified(|snapshot| {
            if snapshot.id != self.id {
                return false;
            }
            update(snapshot);
            true
        });
    }
}

/// Runs at most one session at a time and publishes its snapshots.
pub struct SessionController<F: GenerationFeature> {
    client: GenerationClient,
    shutdown: CancellationToken,
    current: Option<CancellationToken>,
    snapshots: watch::Sender<SessionSnapshot<F::View>>,
    _feature: PhantomData<fn() -> F>,
}

impl<F: GenerationFeature> SessionController<F> {
    pub fn new(client: GenerationClient) -> Self {
        let (snapshots, _) = watch::channel(SessionSnapshot::idle(String::new()));
        Self {
            client,
            shutdown: CancellationToken::new(),
            current: None,
            snapshots,
            _feature: PhantomData,
        }
    }

    /// Validate the form and start a new session, cancelling the active one.
    ///
    /// Validation errors are returned before anything is cancelled or sent.
    pub fn begin(&mut self, request: F) -> Result<JoinHandle<Result<SessionOutcome<F::View>, Error>>, Error> {
        request.validate()?;
        self.cancel();

        let token = self.shutdown.child_token();
        self.current = Some(token.clone());
        let session = StreamSession::new(
            request,
            self.client.config().clone(),
            token,
            self.snapshots.clone(),
        );

        let client = self.client.clone();
        Ok(tokio::spawn(async move { session.run(&client).await }))
    }

    /// Cancel the active session, if any.
    pub fn cancel(&mut self) {
        if let Some(token) = self.current.take() {
            token.cancel();
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot<F::View>> {
        self.snapshots.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot<F::View> {
        self.snapshots.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.snapshots.borrow().status.is_active()
    }
}

impl<F: GenerationFeature> Drop for SessionController<F> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
