//! Rebuild the index when the package store changes on disk.
//!
//! A `notify` watcher covers every storage root. Bursts of events are collapsed
//! into a single rebuild once the store has been quiet for [`DEBOUNCE`].

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tracing::{debug, info, warn};

use crate::state::AppState;

pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// Start watching the storage roots of `state`.
///
/// The watcher lives on a dedicated thread for the rest of the process.
pub fn start_index_watcher(state: Arc<AppState>) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::channel();

    let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
        match res {
            Ok(event) if is_relevant(&event) => {
                let _ = tx.send(());
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Package store watch error"),
        }
    })
    .context("Failed to create package store watcher")?;

    for root in state.index.roots() {
        watcher
            .watch(root, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch '{}'", root.display()))?;
    }

    let roots = state.index.roots().len();
    std::thread::Builder::new()
        .name("index-watcher".to_string())
        .spawn(move || {
            let _watcher = watcher;
            while wait_for_quiet(&rx, DEBOUNCE) {
                info!("Package store changed, rebuilding index");
                if let Ok(index) = state.index.reload() {
                    info!(versions = index.len(), "Index reloaded");
                }
            }
            debug!("Package store watcher stopped");
        })
        .context("Failed to spawn index watcher thread")?;

    info!(roots, "Watching package store for changes");
    Ok(())
}

fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Block until a change arrives, then until no further change arrives for
/// `window`. Returns `false` once the sender is gone.
fn wait_for_quiet(rx: &Receiver<()>, window: Duration) -> bool {
    if rx.recv().is_err() {
        return false;
    }
    loop {
        match rx.recv_timeout(window) {
            Ok(()) => continue,
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return true,
        }
    }
}
