//! Shared types, error definitions, and utilities used across all linkfetch crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, Result},
    types::{DeliveryTarget, PresentationKind, parse_request_url},
};
