pub mod config;
pub mod error;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod middleware;
pub mod server;
pub mod store;

pub use config::Config;
pub use error::{GatewayError, Result};
pub use server::{build_state, create_app, Server};
