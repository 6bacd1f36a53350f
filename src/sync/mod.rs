pub mod cached_data;
pub mod config;
pub mod fetcher;
pub mod mutation;
pub mod poller;
pub mod queries;
pub mod query_cache;
pub mod query_key;
pub mod subscription;

pub use cached_data::{CacheEntry, FetchStatus, StaleDataWarning};
pub use config::SyncConfig;
pub use fetcher::{Extract, QueryData};
pub use mutation::{Mutation, MutationCoordinator, MutationKind, MutationOutcome};
pub use poller::{PollPolicy, PollState};
pub use queries::Query;
pub use query_cache::{CacheStats, QueryCache};
pub use query_key::{Family, KeyPrefix, ListParams, QueryKey, Resource};
pub use subscription::{Subscription, SubscriptionStream};
