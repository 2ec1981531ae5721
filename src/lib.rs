pub mod api;
pub mod auth;
pub mod config;
pub mod counter;
pub mod error;
pub mod map;
pub mod payload;
pub mod primitives;
pub mod queue;
pub mod registry;
pub mod storage;
pub mod telemetry;

pub use error::PrimitiveError;
pub use primitives::Primitives;
pub use vudata_core::{CollectionName, Family};
