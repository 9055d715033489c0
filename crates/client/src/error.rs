// crates/client/src/error.rs
use flashdeck_core::ResolveError;
use thiserror::Error;

/// Errors raised while setting up a progress controller. Failures after
/// setup are reported through the controller's view instead.
#[derive(Debug, Error)]
pub enum TrackError {
    #[error("Cannot resolve progress stream: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}
