use std::time::Duration;

use tracing::{info, warn};

use wellspring_api::AppState;

/// Background task that clears expired password-reset tokens.
pub async fn run_cleanup_loop(state: AppState, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match state.with_db(|db| db.clear_expired_reset_tokens()).await {
            Ok(count) => {
                if count > 0 {
                    info!("Cleanup: cleared {} expired reset tokens", count);
                }
            }
            Err(e) => {
                warn!("Cleanup error: {}", e);
            }
        }
    }
}
