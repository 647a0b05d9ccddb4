mod api;
pub mod dto;
pub mod response;
mod router;
mod state;
pub mod validation;

pub use api::api_router;
pub use router::create_router;
pub use state::AppState;
