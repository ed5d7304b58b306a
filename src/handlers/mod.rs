mod account;
mod gateway;
mod health;
mod metrics;

pub use account::{LoginHandler, UserinfoHandler};
pub use gateway::gateway_handler;
pub use health::health_handler;
pub use metrics::metrics_handler;
