//! Live preview: device setup and perspective updates on height changes.

mod config;
mod session;

pub use config::PreviewConfig;
pub use session::{PreviewSession, PreviewState};
