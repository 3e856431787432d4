//! Delivery collaborator contracts.
//!
//! The retrieval pipeline never talks to a messaging platform directly.
//! It hands artifacts to a [`MediaOutbound`] (status messages, remote
//! passthrough, inline uploads) or a [`LargeFileOutbound`] (uploads above the
//! inline limit through a secondary protocol).

pub mod error;
pub mod outbound;

pub use {
    error::{Error, Result},
    outbound::{LargeFileOutbound, LargeFileSession, MediaOutbound},
};
