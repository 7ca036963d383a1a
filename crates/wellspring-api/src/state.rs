use std::sync::Arc;

use tracing::error;

use wellspring_db::Database;

use crate::error::ApiError;
use crate::mailer::Mailer;
use crate::storage::ProofStorage;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub mailer: Mailer,
    pub proofs: ProofStorage,
    /// Base URL used to build links in outgoing mail.
    pub public_url: String,
    pub secure_cookies: bool,
}

impl AppStateInner {
    /// Run blocking DB work off the async runtime.
    pub async fn with_db<F, T>(self: &Arc<Self>, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = self.clone();
        tokio::task::spawn_blocking(move || f(&state.db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
            })?
            .map_err(ApiError::from)
    }
}
