//! Durable record storage
//!
//! Submissions persist through the `RecordStore` trait. The primary
//! implementation is `SqliteRecordStore`, one JSON document per record.

mod sqlite;
mod traits;

pub use sqlite::SqliteRecordStore;
pub use traits::{OpenStore, RecordStore, StoreError, StoreResult};
