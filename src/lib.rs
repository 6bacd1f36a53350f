pub mod api;
pub mod cache_manager;
pub mod error;
pub mod sync;

pub use cache_manager::CacheManager;
pub use error::{Error, Result};
