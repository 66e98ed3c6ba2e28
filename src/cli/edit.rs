use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};

use crate::core::connection::WebSocketConnector;
use crate::core::entities::{group_by_kind, Entity, EntityKind};
use crate::core::session::{EditingSession, SessionConfig};
use crate::core::store::{ConnectionState, Manuscript, StoreSnapshot, DEFAULT_MANUSCRIPT_TITLE};

const SETTLE_MARGIN: Duration = Duration::from_millis(100);

/// Each stdin line extends the manuscript. After EOF the last text gets one
/// analysis cycle before the session is shut down.
pub async fn run_edit(
    config: SessionConfig,
    manuscript_id: &str,
    title: Option<String>,
) -> Result<(), Box<dyn Error>> {
    let timing = config.timing;
    let manuscript = Manuscript::new(
        manuscript_id,
        title.unwrap_or_else(|| DEFAULT_MANUSCRIPT_TITLE.to_string()),
    );
    let mut session = EditingSession::spawn(config, Arc::new(WebSocketConnector), manuscript);
    let mut updates = session.subscribe();
    let mut printer = SnapshotPrinter::default();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut content = String::new();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str(&line);
                    session.update_content(content.clone());
                }
                None => break,
            },
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                printer.show(&updates.borrow_and_update());
            }
        }
    }

    let quiet_until = Instant::now() + timing.debounce + SETTLE_MARGIN;
    let give_up_at = quiet_until + timing.fallback;
    drain(&mut updates, &mut printer, quiet_until, give_up_at).await;

    session.shutdown().await;
    Ok(())
}

async fn drain(
    updates: &mut watch::Receiver<StoreSnapshot>,
    printer: &mut SnapshotPrinter,
    quiet_until: Instant,
    give_up_at: Instant,
) {
    loop {
        let now = Instant::now();
        let idle = !updates.borrow().processing;
        if now >= give_up_at || (now >= quiet_until && idle) {
            return;
        }

        let wake = if now < quiet_until {
            quiet_until
        } else {
            give_up_at
        };
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    return;
                }
                printer.show(&updates.borrow_and_update());
            }
            _ = sleep_until(wake) => {}
        }
    }
}

/// Prints connection changes to stderr and entity list changes to stdout.
#[derive(Default)]
struct SnapshotPrinter {
    connection: Option<ConnectionState>,
    entities: Vec<Entity>,
}

impl SnapshotPrinter {
    fn show(&mut self, snapshot: &StoreSnapshot) {
        if self.connection != Some(snapshot.connection) {
            self.connection = Some(snapshot.connection);
            eprintln!("[{}]", snapshot.connection.label());
        }
        if self.entities != snapshot.entities {
            self.entities = snapshot.entities.clone();
            print!("{}", render_entities(&self.entities));
        }
    }
}

pub fn render_entities(entities: &[Entity]) -> String {
    if entities.is_empty() {
        return "No entities\n".to_string();
    }

    let mut out = String::new();
    for (kind, members) in group_by_kind(entities) {
        let names: Vec<String> = members
            .iter()
            .map(|entity| match &entity.kind {
                EntityKind::Unknown(raw) if !raw.is_empty() => {
                    format!("{} ({raw})", entity.text)
                }
                _ => entity.text.clone(),
            })
            .collect();
        out.push_str(&format!("{kind}: {}\n", names.join(", ")));
    }
    out
}
