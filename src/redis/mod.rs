//! Redis pub/sub: channels with route-key suffixes and pattern
//! subscriptions.
//!
//! Enable the `redis` feature for `RedisConnector`, which talks to a real
//! server through the `redis` crate.

#[cfg(feature = "redis")]
mod client;
mod frame;
mod module;
mod router;
mod settings;

#[cfg(feature = "redis")]
pub use client::{RedisConnection, RedisConnector};
pub use frame::{channel_name, decode_frame, encode_frame};
pub use module::RedisModule;
pub use router::RedisRouter;
pub use settings::{RedisConnectionSettings, RedisSettings};
