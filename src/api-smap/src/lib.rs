pub mod cache;
pub mod routes;
pub mod state;

pub use state::AppState;
