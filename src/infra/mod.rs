pub mod covers;
pub mod listing;
pub mod metadata;
pub mod rate_limiter;
pub mod store;
