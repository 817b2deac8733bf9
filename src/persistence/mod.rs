//! Durable breaker state.
//!
//! A breaker writes a JSON snapshot of its metrics after every state change
//! and every recorded outcome, and reads it back when it is constructed.
//! Writes are best effort: failures are logged and never affect a call.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use callguard::persistence::FilesystemPersistence;
//! use callguard::{BreakerRegistry, RegistryConfig};
//! use std::sync::Arc;
//!
//! let store = FilesystemPersistence::new("/var/lib/agri/breakers")?;
//! let registry = BreakerRegistry::builder()
//!     .with_persistence(Arc::new(store))
//!     .build();
//! ```

mod filesystem;
mod memory;
mod traits;

pub use filesystem::FilesystemPersistence;
pub use memory::InMemoryPersistence;
pub use traits::{snapshot_key, NoOpPersistence, PersistenceAdapter};

use std::sync::Arc;

/// A shared persistence adapter.
pub type ArcPersistence = Arc<dyn PersistenceAdapter>;
