//! Company directory service
//!
//! Keeps the local company cache in sync with the repository's companies
//! file. The cache is replaced wholesale on each successful refresh; reads
//! always come from the cache so the directory works offline.

use std::sync::Arc;

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;

use fieldnote_common::api::types::Company;
use fieldnote_common::{time, AppEvent, EventBus};

use crate::client::{BackendClient, ClientError};
use crate::session::{SessionError, SessionManager};
use crate::store::{companies, settings};
use crate::vault::TOKEN_REPO;

/// Directory refresh failures
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Session could not provide the repository token
    #[error(transparent)]
    Auth(#[from] SessionError),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("storage error: {0}")]
    Storage(#[from] fieldnote_common::Error),
}

/// Cached, refreshable company directory
pub struct CompanyDirectory {
    pool: SqlitePool,
    client: BackendClient,
    session: Arc<SessionManager>,
    events: EventBus,
}

impl CompanyDirectory {
    pub fn new(
        pool: SqlitePool,
        client: BackendClient,
        session: Arc<SessionManager>,
        events: EventBus,
    ) -> Self {
        Self {
            pool,
            client,
            session,
            events,
        }
    }

    /// Replace the cache from the repository
    ///
    /// Returns the number of companies cached. Requires an unlocked
    /// session holding the repository token.
    pub async fn refresh(&self) -> Result<usize, DirectoryError> {
        let bearer = self.session.token(TOKEN_REPO).await?;
        let data = self.client.fetch_companies(&bearer).await?;

        companies::replace_all(&self.pool, &data.companies).await?;
        settings::set_last_companies_refresh(&self.pool, &time::now().to_rfc3339()).await?;

        info!("Company directory refreshed: {} entries", data.companies.len());
        self.events.emit_lossy(AppEvent::CompaniesRefreshed {
            count: data.companies.len(),
            timestamp: time::now(),
        });
        Ok(data.companies.len())
    }

    /// Load the cache, then refresh when online
    ///
    /// A failed refresh is not fatal: the cached directory keeps serving,
    /// which is the whole point of caching it.
    pub async fn initialize(&self, online: bool) -> Result<Vec<Company>, DirectoryError> {
        let cached = companies::all(&self.pool).await?;
        if !online {
            return Ok(cached);
        }
        match self.refresh().await {
            Ok(_) => Ok(companies::all(&self.pool).await?),
            Err(e) => {
                tracing::warn!("Directory refresh failed, serving cache: {e}");
                Ok(cached)
            }
        }
    }

    /// Cached directory, name order
    pub async fn all(&self) -> Result<Vec<Company>, DirectoryError> {
        Ok(companies::all(&self.pool).await?)
    }

    /// Case-insensitive search over the cache
    pub async fn search(&self, query: &str) -> Result<Vec<Company>, DirectoryError> {
        Ok(companies::search(&self.pool, query).await?)
    }
}
