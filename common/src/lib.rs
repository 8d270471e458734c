pub mod bytes;
pub mod clock;
pub mod serde;
pub mod storage;

pub use self::bytes::BytesRange;
pub use clock::{Clock, MockClock, SystemClock};
pub use storage::config::StorageConfig;
pub use storage::factory::create_storage;
pub use storage::{
    Precondition, Record, Storage, StorageError, StorageIterator, StorageRead,
    StorageResult, WriteOptions, WriteOutcome,
};
