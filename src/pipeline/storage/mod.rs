// Catalog persistence: the store trait and its backends

pub mod in_memory;
pub mod sqlite;
pub mod traits;

pub use in_memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{validate_indicator, CatalogStore, MAX_TITLE_LEN};

use std::sync::{Mutex, MutexGuard};

use crate::error::{EtlError, Result};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| EtlError::storage(format!("store lock poisoned: {}", e)))
}
