pub mod config;
pub mod error;
pub mod ids;
pub mod tick;

pub use config::DriverConfig;
pub use error::*;
pub use ids::{OwnerId, TaskId};
pub use tick::Tick;
