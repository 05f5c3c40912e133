// TodoStore - Personal task list persisted to a key-value slot

pub mod clock;
pub mod codec;
pub mod config;
pub mod filter;
pub mod ids;
pub mod models;
pub mod storage;
pub mod store;

// Re-export main types for convenience
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Backend, Config, StorageConfig};
pub use filter::TaskFilter;
pub use models::{EditSession, Task, TaskId};
pub use storage::{FileStorage, MemoryStorage, SqliteStorage, Storage};
pub use store::{DEFAULT_KEY, TaskListStore};
