pub mod cache;
pub mod cleanup;
pub mod feed;
pub mod ids;
pub mod metrics;
pub mod provider;
pub mod redis;
pub mod stirr;
pub mod xumo;
