//! Single source of truth for the editing session.
//!
//! [`StateStore`] holds the manuscript, the entity list, the connection
//! state and the processing flag. Fields are private; every mutation goes
//! through one of the named actions, and each action publishes a fresh
//! [`StoreSnapshot`] on a `watch` channel for observers.

use tokio::sync::watch;

use crate::core::entities::Entity;

pub const DEFAULT_MANUSCRIPT_ID: &str = "default";
pub const DEFAULT_MANUSCRIPT_TITLE: &str = "Untitled Manuscript";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manuscript {
    pub id: String,
    pub title: String,
    pub content: String,
    /// 1-based.
    pub chapter: u32,
    pub paragraph: u32,
}

impl Manuscript {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Self::default()
        }
    }
}

impl Default for Manuscript {
    fn default() -> Self {
        Self {
            id: DEFAULT_MANUSCRIPT_ID.to_string(),
            title: DEFAULT_MANUSCRIPT_TITLE.to_string(),
            content: String::new(),
            chapter: 1,
            paragraph: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn is_connected(self) -> bool {
        self == ConnectionState::Connected
    }

    /// Status indicator text; a dropped connection reads as "Offline".
    pub fn label(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Offline",
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Connected => "Connected",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StoreSnapshot {
    pub manuscript: Manuscript,
    pub entities: Vec<Entity>,
    pub connection: ConnectionState,
    pub processing: bool,
}

pub struct StateStore {
    state: StoreSnapshot,
    publisher: watch::Sender<StoreSnapshot>,
}

impl StateStore {
    pub fn new(manuscript: Manuscript) -> Self {
        let state = StoreSnapshot {
            manuscript: sanitize(manuscript),
            ..StoreSnapshot::default()
        };
        let (publisher, _) = watch::channel(state.clone());
        Self { state, publisher }
    }

    pub fn subscribe(&self) -> watch::Receiver<StoreSnapshot> {
        self.publisher.subscribe()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.clone()
    }

    pub fn manuscript(&self) -> &Manuscript {
        &self.state.manuscript
    }

    pub fn entities(&self) -> &[Entity] {
        &self.state.entities
    }

    pub fn connection(&self) -> ConnectionState {
        self.state.connection
    }

    pub fn is_connected(&self) -> bool {
        self.state.connection.is_connected()
    }

    pub fn is_processing(&self) -> bool {
        self.state.processing
    }

    /// Replace the manuscript text; chapter, paragraph, id and title are kept.
    pub fn update_content(&mut self, content: impl Into<String>) {
        self.state.manuscript.content = content.into();
        self.publish();
    }

    /// Replace the entity list wholesale.
    pub fn set_entities(&mut self, entities: Vec<Entity>) {
        self.state.entities = entities;
        self.publish();
    }

    pub fn set_connected(&mut self, connection: ConnectionState) {
        if self.state.connection == connection {
            return;
        }
        self.state.connection = connection;
        self.publish();
    }

    pub fn set_processing(&mut self, processing: bool) {
        if self.state.processing == processing {
            return;
        }
        self.state.processing = processing;
        self.publish();
    }

    /// Back to the default manuscript with no entities and no work in flight.
    /// The connection state is owned by the connection and left as is.
    pub fn reset_story(&mut self) {
        self.clear_story(Manuscript::default());
        self.publish();
    }

    /// Swap in another manuscript with a clean story, offline until its own
    /// connection comes up. Subscribers see a single snapshot.
    pub fn open_story(&mut self, manuscript: Manuscript) {
        self.clear_story(sanitize(manuscript));
        self.state.connection = ConnectionState::Disconnected;
        self.publish();
    }

    fn clear_story(&mut self, manuscript: Manuscript) {
        self.state.manuscript = manuscript;
        self.state.entities.clear();
        self.state.processing = false;
    }

    fn publish(&self) {
        self.publisher.send_replace(self.state.clone());
    }
}

fn sanitize(mut manuscript: Manuscript) -> Manuscript {
    manuscript.chapter = manuscript.chapter.max(1);
    manuscript
}
