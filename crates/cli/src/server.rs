//! HTTP surface: sync status and the change event stream

use crate::daemon::{SharedStatus, SyncStatus};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use ledger_core::{Database, RowCounts};
use ledger_watcher::{ChangeEvent, Notifier};
use serde::Serialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

/// SSE event name for content changes
pub const CHANGE_EVENT_NAME: &str = "data_changed";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub notifier: Notifier,
    pub status: SharedStatus,
    pub volatile_host: bool,
    pub remote_available: bool,
    /// Closes open event streams so graceful shutdown can finish
    pub shutdown: broadcast::Sender<()>,
}

/// Body of `GET /sync/status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: &'static str,
    pub volatile_host: bool,
    pub remote_available: bool,
    pub last_backup: Option<DateTime<Utc>>,
    pub subscribers: usize,
    pub fingerprint: Option<String>,
    pub row_counts: Option<RowCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Assemble the status body. A database that could not be read marks the
/// daemon as degraded rather than failing the request.
pub fn build_status_report(
    status: &SyncStatus,
    volatile_host: bool,
    remote_available: bool,
    subscribers: usize,
    database: ledger_core::Result<(String, RowCounts)>,
) -> StatusReport {
    let (state, fingerprint, row_counts, db_error) = match database {
        Ok((fingerprint, counts)) => ("online", Some(fingerprint), Some(counts), None),
        Err(e) => ("degraded", None, None, Some(e.reason())),
    };

    StatusReport {
        status: state,
        volatile_host,
        remote_available,
        last_backup: status.last_backup,
        subscribers,
        fingerprint,
        row_counts,
        last_error: db_error.or_else(|| status.last_error.clone()),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sync/status", get(sync_status))
        .route("/events", get(events))
        .with_state(Arc::new(state))
}

/// Serve until a shutdown message arrives
pub async fn run(
    bind: &str,
    state: AppState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    tracing::info!("Serving status and events on http://{}", bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}

/// GET /sync/status
async fn sync_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusReport>, (StatusCode, String)> {
    let db = state.db.clone();
    let database = tokio::task::spawn_blocking(move || -> ledger_core::Result<(String, RowCounts)> {
        let fingerprint = db.fingerprint()?;
        let counts = db.row_counts()?;
        Ok((fingerprint.to_hex(), counts))
    })
    .await
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Status task failed: {}", e),
        )
    })?;

    let status = state.status.read().await;
    Ok(Json(build_status_report(
        &status,
        state.volatile_host,
        state.remote_available,
        state.notifier.subscriber_count(),
        database,
    )))
}

/// GET /events
async fn events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    tracing::debug!("Event subscriber connected");
    let stream = change_feed(&state.notifier, &state.shutdown).filter_map(|event| {
        match Event::default().event(CHANGE_EVENT_NAME).json_data(&event) {
            Ok(sse) => Some(Ok(sse)),
            Err(e) => {
                tracing::warn!("Could not encode change event: {}", e);
                None
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

enum Feed {
    Change(ChangeEvent),
    Closed,
}

/// Change events from the moment of subscription until shutdown.
///
/// A lagging subscriber skips the events it missed.
pub fn change_feed(
    notifier: &Notifier,
    shutdown: &broadcast::Sender<()>,
) -> impl Stream<Item = ChangeEvent> {
    let changes = BroadcastStream::new(notifier.subscribe()).filter_map(|received| match received {
        Ok(event) => Some(Feed::Change(event)),
        Err(e) => {
            tracing::debug!("Event subscriber lagged: {}", e);
            None
        }
    });
    let closing = BroadcastStream::new(shutdown.subscribe()).map(|_| Feed::Closed);

    changes.merge(closing).map_while(|feed| match feed {
        Feed::Change(event) => Some(event),
        Feed::Closed => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::SyncError;

    #[test]
    fn test_status_report_online() {
        let mut status = SyncStatus::new(Utc::now());
        status.last_backup = Some(Utc::now());

        let counts = RowCounts {
            ledger: 4,
            lookup: 2,
        };
        let report = build_status_report(&status, true, false, 3, Ok(("ab12".to_string(), counts)));

        assert_eq!(report.status, "online");
        assert!(report.volatile_host);
        assert!(!report.remote_available);
        assert_eq!(report.subscribers, 3);
        assert_eq!(report.fingerprint.as_deref(), Some("ab12"));
        assert_eq!(report.row_counts, Some(counts));
        assert_eq!(report.last_backup, status.last_backup);
    }

    #[test]
    fn test_status_report_degraded() {
        let status = SyncStatus::new(Utc::now());
        let report = build_status_report(
            &status,
            false,
            true,
            0,
            Err(SyncError::Restore("database locked".to_string())),
        );

        assert_eq!(report.status, "degraded");
        assert!(report.fingerprint.is_none());
        assert!(report.last_error.unwrap().contains("database locked"));
    }

    #[tokio::test]
    async fn test_change_feed_delivers_until_shutdown() {
        let notifier = Notifier::new(8);
        let (shutdown, _) = broadcast::channel(1);
        let mut feed = Box::pin(change_feed(&notifier, &shutdown));

        let event = ChangeEvent {
            timestamp: Utc::now(),
            fingerprint: "00ff".to_string(),
        };
        assert_eq!(notifier.publish(event.clone()), 1);
        assert_eq!(feed.next().await, Some(event));

        shutdown.send(()).unwrap();
        assert_eq!(feed.next().await, None);
    }
}
