//! Meshgate Registry - mesh device ↔ call sign bindings
//!
//! This crate keeps the identity mapping the gateway routes by.
//!
//! ## Components
//!
//! - **event**: registration events and the timestamp-replay merge
//! - **store**: SQLite persistence of Local and Beaconed events with sqlx
//! - **seed**: the community precompiled list and operator overrides
//! - **registry**: the [`Registry`] tying the sources together
//! - **error**: registry-specific error types
//!
//! ## Example
//!
//! ```ignore
//! use meshgate_registry::Registry;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut registry = Registry::open("data").await?;
//!     registry
//!         .add_registration(Some("!a1b2c3d4"), Some("N0CALL-1"), None, true)
//!         .await?;
//!     assert_eq!(registry.lookup("!a1b2c3d4"), Some("N0CALL-1"));
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod event;
pub mod registry;
pub mod seed;
pub mod store;

// Re-exports for convenience
pub use error::{RegistryError, Result};
pub use event::{Entry, MergedView, Registration, Source};
pub use registry::{Registry, DATABASE_FILE, OVERRIDES_FILE, PRECOMPILED_FILE};
pub use seed::{RegistryOptions, SeedFile, SeedTuple};
pub use store::RegistrationStore;
