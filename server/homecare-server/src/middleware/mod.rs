pub mod auth_context;
pub mod layers;

pub use auth_context::{bearer_token, AuthContext};
pub use layers::{create_cors_layer, request_timing_middleware};
