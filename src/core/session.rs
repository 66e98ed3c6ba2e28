//! The editing session: one task that owns the store, the submission
//! controller, the timers and the live connection for the open manuscript.
//!
//! Callers talk to it through a [`SessionHandle`]. Every write goes through
//! the handle's channel, so the store only ever has one writer; reads are
//! served from the store's `watch` snapshots.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::InboundMessage;
use crate::core::connection::{
    ConnectionEvent, ConnectionManager, ConnectionParams, Connector, ReconnectPolicy,
};
use crate::core::entities::normalize_entities;
use crate::core::store::{ConnectionState, Manuscript, StateStore, StoreSnapshot};
use crate::core::submission::{
    Submission, SubmissionController, SubmissionTiming, TimerCommand,
};
use crate::core::timers::{TimerFired, TimerKey, TimerSet};
use crate::utils::url::manuscript_socket_url;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HTTP(S) base address of the analysis service.
    pub base_url: String,
    pub timing: SubmissionTiming,
    pub reconnect: ReconnectPolicy,
}

impl SessionConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timing: SubmissionTiming::default(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[derive(Debug)]
enum SessionInput {
    UpdateContent(String),
    AnalyzeNow,
    OpenManuscript { id: String, title: String },
}

pub struct SessionHandle {
    inputs: mpsc::UnboundedSender<SessionInput>,
    snapshots: watch::Receiver<StoreSnapshot>,
    scope: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    /// Replace the manuscript text and restart the debounce window.
    pub fn update_content(&self, content: impl Into<String>) {
        self.submit(SessionInput::UpdateContent(content.into()));
    }

    /// Submit the current text immediately, even if it was already analyzed.
    pub fn analyze_now(&self) {
        self.submit(SessionInput::AnalyzeNow);
    }

    /// Switch to another manuscript. Pending work for the current one is
    /// dropped and a new connection is opened.
    pub fn open_manuscript(&self, id: impl Into<String>, title: impl Into<String>) {
        self.submit(SessionInput::OpenManuscript {
            id: id.into(),
            title: title.into(),
        });
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.snapshots.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.scope.is_cancelled()
    }

    /// Cancel all timers, close the connection and wait for the session task
    /// to exit. Calling it again is a no-op.
    pub async fn shutdown(&mut self) {
        self.scope.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "editing session task failed");
            }
        }
    }

    fn submit(&self, input: SessionInput) {
        if self.inputs.send(input).is_err() {
            debug!("editing session has stopped; input dropped");
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.scope.cancel();
    }
}

pub struct EditingSession {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    store: StateStore,
    controller: SubmissionController,
    timers: TimerSet,
    connection: Option<ConnectionManager>,
    events: mpsc::UnboundedSender<(ConnectionEvent, u64)>,
    next_link_id: u64,
    scope: CancellationToken,
}

impl EditingSession {
    /// Start a session for `manuscript` and connect right away. Must be
    /// called from within a Tokio runtime.
    pub fn spawn(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        manuscript: Manuscript,
    ) -> SessionHandle {
        let scope = CancellationToken::new();
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (timers, timer_rx) = TimerSet::new(scope.child_token());

        let store = StateStore::new(manuscript);
        let snapshots = store.subscribe();
        let controller = SubmissionController::new(config.timing);

        let session = EditingSession {
            config,
            connector,
            store,
            controller,
            timers,
            connection: None,
            events: events_tx,
            next_link_id: 0,
            scope: scope.clone(),
        };
        let task = tokio::spawn(session.run(inputs_rx, events_rx, timer_rx));

        SessionHandle {
            inputs: inputs_tx,
            snapshots,
            scope,
            task: Some(task),
        }
    }

    async fn run(
        mut self,
        mut inputs: mpsc::UnboundedReceiver<SessionInput>,
        mut events: mpsc::UnboundedReceiver<(ConnectionEvent, u64)>,
        mut timer_reports: mpsc::UnboundedReceiver<TimerFired>,
    ) {
        self.connect();

        loop {
            tokio::select! {
                _ = self.scope.cancelled() => break,
                input = inputs.recv() => match input {
                    Some(input) => self.handle_input(input),
                    None => break,
                },
                Some((event, link_id)) = events.recv() => self.handle_connection_event(event, link_id),
                Some(fired) = timer_reports.recv() => self.handle_timer(fired),
            }
        }

        self.teardown().await;
    }

    fn handle_input(&mut self, input: SessionInput) {
        match input {
            SessionInput::UpdateContent(content) => {
                self.store.update_content(content);
                let commands = self.controller.content_changed();
                self.apply(commands);
            }
            SessionInput::AnalyzeNow => {
                match self
                    .controller
                    .analyze_now(self.store.manuscript(), self.store.connection())
                {
                    Ok(submission) => self.transmit(submission),
                    Err(reason) => debug!(?reason, "analyze request skipped"),
                }
            }
            SessionInput::OpenManuscript { id, title } => self.switch_manuscript(id, title),
        }
    }

    fn switch_manuscript(&mut self, id: String, title: String) {
        info!(manuscript = %id, "opening manuscript");
        self.timers.cancel_all();
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.controller.reset();

        self.store.open_story(Manuscript::new(id, title));
        self.connect();
    }

    fn connect(&mut self) {
        let manuscript_id = &self.store.manuscript().id;
        let Some(url) = manuscript_socket_url(&self.config.base_url, manuscript_id) else {
            warn!(
                base_url = %self.config.base_url,
                manuscript = %manuscript_id,
                "cannot derive a socket address; staying offline"
            );
            return;
        };

        self.next_link_id += 1;
        self.connection = Some(ConnectionManager::open(ConnectionParams {
            connector: Arc::clone(&self.connector),
            url: url.to_string(),
            policy: self.config.reconnect.clone(),
            events: self.events.clone(),
            link_id: self.next_link_id,
            scope: self.scope.clone(),
        }));
    }

    fn handle_connection_event(&mut self, event: ConnectionEvent, link_id: u64) {
        let current = self.connection.as_ref().map(ConnectionManager::link_id);
        if current != Some(link_id) {
            debug!(link = link_id, "ignoring event from a replaced connection");
            return;
        }

        match event {
            ConnectionEvent::StateChanged(state) => {
                if state == ConnectionState::Disconnected {
                    self.controller.connection_lost();
                }
                self.store.set_connected(state);
            }
            ConnectionEvent::Message(InboundMessage::EntitiesExtracted { payload }) => {
                let entities = normalize_entities(payload.as_ref());
                let attribution = self.controller.response_received();
                debug!(
                    count = entities.len(),
                    submission = ?attribution.submission,
                    completed = attribution.completed,
                    "entities extracted"
                );

                self.store.set_entities(entities);
                if attribution.completed {
                    self.store.set_processing(false);
                }
                self.apply(attribution.commands);
            }
            ConnectionEvent::Malformed { error } => {
                debug!(%error, "abandoning in-flight analysis after unreadable reply");
                let commands = self.controller.malformed_received();
                self.store.set_processing(false);
                self.apply(commands);
            }
        }
    }

    fn handle_timer(&mut self, fired: TimerFired) {
        if !self.timers.fired(fired) {
            return;
        }

        match fired.key {
            TimerKey::Debounce => {
                match self
                    .controller
                    .debounce_elapsed(self.store.manuscript(), self.store.connection())
                {
                    Ok(submission) => self.transmit(submission),
                    Err(reason) => debug!(?reason, "analysis skipped"),
                }
            }
            TimerKey::Fallback(id) => {
                if let Some(commands) = self.controller.fallback_elapsed(id) {
                    info!(submission = %id, "no extraction result in time; clearing processing");
                    self.store.set_processing(false);
                    self.apply(commands);
                }
            }
        }
    }

    fn transmit(&mut self, submission: Submission) {
        let sent = self
            .connection
            .as_ref()
            .is_some_and(|connection| connection.send(&submission.frame));
        if !sent {
            debug!(submission = %submission.id, "connection not ready; submission dropped");
            return;
        }

        info!(
            submission = %submission.id,
            chapter = submission.frame.chapter,
            paragraph = submission.frame.paragraph,
            "paragraph sent for analysis"
        );
        let commands = self.controller.mark_sent(submission);
        self.store.set_processing(true);
        self.apply(commands);
    }

    fn apply(&mut self, commands: Vec<TimerCommand>) {
        for command in commands {
            match command {
                TimerCommand::ArmDebounce(after) => self.timers.arm(TimerKey::Debounce, after),
                TimerCommand::CancelDebounce => {
                    self.timers.cancel(TimerKey::Debounce);
                }
                TimerCommand::ArmFallback(id, after) => {
                    self.timers.arm(TimerKey::Fallback(id), after)
                }
                TimerCommand::CancelFallback(id) => {
                    self.timers.cancel(TimerKey::Fallback(id));
                }
            }
        }
    }

    async fn teardown(&mut self) {
        self.timers.cancel_all();
        if let Some(mut connection) = self.connection.take() {
            connection.close_and_wait().await;
        }
        self.store.set_connected(ConnectionState::Disconnected);
        self.store.set_processing(false);
        debug!("editing session stopped");
    }
}
