pub mod memory;
pub mod sqlite;
pub mod store;
pub mod types;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{CredentialStore, LocalStore};
pub use types::{Result, StoreError};
