mod error;
mod provision;
mod routes;
mod server;
mod state;

pub use error::ApiError;
pub use provision::provision;
pub use routes::{BatchResponse, ItemResult};
pub use server::{router, GatewayServer};
pub use state::AppState;
