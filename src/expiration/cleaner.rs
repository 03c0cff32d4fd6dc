use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::AppState;

/// Start the background expiration cleaner task
pub fn start_expiration_cleaner(state: Arc<AppState>) -> JoinHandle<()> {
    let interval = Duration::from_secs(state.config.tokens.cleanup_interval_seconds);

    tokio::spawn(async move {
        let mut interval_timer = tokio::time::interval(interval);

        loop {
            interval_timer.tick().await;
            run_cleanup(&state).await;
        }
    })
}

async fn run_cleanup(state: &AppState) {
    debug!("Running expiration cleanup");

    let db = state.db.clone();
    let result = tokio::task::spawn_blocking(move || {
        let now = Utc::now();
        (
            db.purge_expired_replays(now),
            db.purge_expired_attempts(now),
            db.purge_expired_tokens(now),
        )
    })
    .await;

    let (replay_result, attempt_result, token_result) = match result {
        Ok(results) => results,
        Err(e) => {
            error!(error = %e, "Expiration cleanup task panicked");
            return;
        }
    };

    match replay_result {
        Ok(count) if count > 0 => debug!(replays_cleaned = count, "Expired replay records cleaned"),
        Err(e) => error!(error = %e, "Failed to clean up expired replay records"),
        _ => {}
    }

    match attempt_result {
        Ok(count) if count > 0 => {
            debug!(attempts_cleaned = count, "Expired verification attempts cleaned")
        }
        Err(e) => error!(error = %e, "Failed to clean up expired verification attempts"),
        _ => {}
    }

    match token_result {
        Ok(count) if count > 0 => debug!(tokens_cleaned = count, "Expired tokens cleaned"),
        Err(e) => error!(error = %e, "Failed to clean up expired tokens"),
        _ => {}
    }
}
