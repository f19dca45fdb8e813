pub mod idarr;
pub mod pool;

pub use idarr::IdArr;
pub use pool::MemoryPool;
