//! HTTP surface for podclip.

pub mod config;
pub mod directory;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::ApiConfig;
pub use directory::{EpisodeDirectory, HttpEpisodeDirectory, StaticEpisodeDirectory};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::AppState;
