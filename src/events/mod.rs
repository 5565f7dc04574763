pub mod progress_hub;

// Re-export key types for convenience
pub use progress_hub::{ProgressHub, StatusEvent, Subscription};
