//! HTTP gateway server

mod error;
mod handler;
pub mod server;

pub use error::GatewayError;
pub use handler::ProxyHandler;
pub use server::{build_router, run_server, ProxyState};
