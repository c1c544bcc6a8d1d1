pub use crate::adaptive::AdaptiveShardSnapshot;
pub use crate::builder::CacheBuilder;
pub use crate::cache::{CloxCache, Config};
pub use crate::error::{ConfigError, InvariantError};
pub use crate::metrics::Stats;
pub use crate::traits::BytesKey;
