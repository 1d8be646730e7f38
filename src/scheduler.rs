//! Scheduler / Dispatcher (spec.md section 4.8): maps three fixed tick
//! periods to pipelines, running retention cleanup alongside the long-period
//! tick. A pipeline failure never aborts a tick — each pipeline already
//! reports its own errors on its [`crate::pipelines::PipelineSummary`]
//! instead of panicking, so there's nothing here to catch. The three tick
//! kinds are a closed enum, so spec.md section 4.8's "unknown tick pattern"
//! case is a compile-time impossibility rather than a runtime log line.

use crate::app::AppState;
use crate::pipelines::backfill;
use crate::pipelines::discovery;
use crate::pipelines::update;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

const DISCOVERY_PERIOD: Duration = Duration::from_secs(3 * 60);
const UPDATE_PERIOD: Duration = Duration::from_secs(10 * 60);
const BACKFILL_PERIOD: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Clone, Copy)]
enum Tick {
    Discovery,
    Update,
    Backfill,
}

impl Tick {
    fn name(self) -> &'static str {
        match self {
            Self::Discovery => "discovery",
            Self::Update => "update",
            Self::Backfill => "backfill",
        }
    }
}

/// Spawns one background task per tick period. Callers hold onto the
/// returned handles to abort them on graceful shutdown.
pub fn spawn(state: AppState) -> Vec<JoinHandle<()>> {
    vec![
        spawn_tick(state.clone(), DISCOVERY_PERIOD, Tick::Discovery),
        spawn_tick(state.clone(), UPDATE_PERIOD, Tick::Update),
        spawn_tick(state, BACKFILL_PERIOD, Tick::Backfill),
    ]
}

fn spawn_tick(state: AppState, period: Duration, tick: Tick) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            dispatch(&state, tick).await;
        }
    })
}

async fn dispatch(state: &AppState, tick: Tick) {
    let summary = match tick {
        Tick::Discovery => discovery::run(state.upstream.as_ref(), &state.store, &state.config).await,
        Tick::Update => update::run(state.upstream.as_ref(), &state.store, &state.config).await,
        Tick::Backfill => {
            let summary = backfill::run(state.upstream.as_ref(), &state.ai, &state.vector_store, &state.store, &state.config).await;
            run_cleanup(&state.store);
            summary
        }
    };
    if summary.success {
        info!(pipeline = tick.name(), processed = summary.items_processed, changed = summary.items_changed, "pipeline run completed");
    } else {
        error!(pipeline = tick.name(), errors = summary.errors, error_messages = ?summary.error_messages, "pipeline run completed with errors");
    }
}

/// Retention cleanup (spec.md section 3), run alongside the long-period
/// backfill tick.
fn run_cleanup(store: &crate::store::Store) {
    match store.cleanup_old_rows() {
        Ok((errors_purged, metrics_purged)) => info!(errors_purged, metrics_purged, "retention cleanup completed"),
        Err(err) => warn!(%err, "retention cleanup failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_names_are_stable_strings() {
        assert_eq!(Tick::Discovery.name(), "discovery");
        assert_eq!(Tick::Update.name(), "update");
        assert_eq!(Tick::Backfill.name(), "backfill");
    }
}
