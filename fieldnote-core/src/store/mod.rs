//! Local persisted storage
//!
//! One query module per table. These are thin data-access layers: no
//! business rules, no event emission; the vault, session manager, and
//! pipeline own the semantics and call down into here.

pub mod companies;
pub mod credentials;
pub mod notes;
pub mod settings;
pub mod snapshot;
pub mod webauthn;
