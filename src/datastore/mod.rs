mod storage;

pub use storage::ListStorage;
pub use storage::MemoryStorage;
pub use storage::Simulation;
pub use storage::Storage;
pub use storage::StorageError;
pub use storage::TaskStorage;
