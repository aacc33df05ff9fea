// Web server module
// Exposes the enhancement pipeline over HTTP/JSON

mod app;
mod error;
mod handlers;
mod listeners;
mod models;

pub use app::create_app;
pub use listeners::create_listener;

use crate::pipeline::Pipeline;
use std::sync::Arc;

// Maximum allowed size for request bodies; images travel base64-encoded in JSON
pub const MAX_IMAGE_SIZE_BYTES: usize = 100 * 1024 * 1024; // 100MB

pub type SharedPipeline = Arc<Pipeline>;
