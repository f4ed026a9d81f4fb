//! # Fieldnote Core
//!
//! The offline-first client core: credential vault, session lifecycle,
//! biometric quick-unlock, local note store, AI processing pipeline, and
//! the offline sync engine.
//!
//! Components are explicit service objects constructed once at startup and
//! passed by reference; there is no hidden global state. A typical wiring:
//!
//! ```ignore
//! let pool = fieldnote_common::db::init_database(&db_path).await?;
//! let events = EventBus::new(256);
//! let vault = CredentialVault::new(pool.clone());
//! let session = Arc::new(SessionManager::new(pool.clone(), vault, events.clone()));
//! let client = BackendClient::new(config.backend_url_or_default());
//! let pipeline = Arc::new(Pipeline::new(pool.clone(), client, session.clone(), events.clone()));
//! let engine = SyncEngine::new(pool, pipeline, events, online_rx);
//! tokio::spawn(engine.run());
//! ```

pub mod assist;
pub mod client;
pub mod crypto;
pub mod directory;
pub mod pipeline;
pub mod quick_unlock;
pub mod session;
pub mod store;
pub mod sync;
pub mod vault;

pub use client::BackendClient;
pub use directory::CompanyDirectory;
pub use pipeline::Pipeline;
pub use quick_unlock::{PlatformAuthenticator, QuickUnlock};
pub use session::SessionManager;
pub use sync::SyncEngine;
pub use vault::CredentialVault;
