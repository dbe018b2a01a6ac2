pub mod memory;
pub mod sqlite;

pub use self::memory::{MemoryDatabase, MemorySink};
pub use self::sqlite::{SqliteDatabase, SqliteSink};
