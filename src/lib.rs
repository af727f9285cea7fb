mod client;
mod error;
mod normalize;
mod poller;
mod session;
mod types;

pub use client::{AtmeexClient, AtmeexClientBuilder, DEFAULT_BASE_URL};
pub use error::{Error, Result};
pub use normalize::normalize;
pub use poller::{Coordinator, DEFAULT_POLL_INTERVAL, RELAXED_POLL_INTERVAL};
pub use types::*;
