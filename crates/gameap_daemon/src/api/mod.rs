//! REST client for the panel API.

mod client;

pub use client::{ApiClient, MAX_TRANSPORT_RETRIES};
