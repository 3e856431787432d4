//! Retrieval-and-delivery pipeline.
//!
//! A request URL is classified ([`mime`]), retrieved through an ordered chain
//! of [`strategy`] implementations driven by the [`pipeline::Orchestrator`],
//! and handed to the [`delivery::DeliveryRouter`]. Retrieval work runs on the
//! bounded [`bridge::ExecutionBridge`]; the [`cleanup::Janitor`] keeps the
//! shared downloads directory free of stale and partial files.

pub mod bridge;
pub mod cleanup;
pub mod delivery;
pub mod error;
pub mod extract;
pub mod mime;
pub mod pipeline;
pub mod quirks;
pub mod request;
pub mod store;
pub mod strategy;

pub use {
    bridge::{BridgeError, ExecutionBridge, WorkItem},
    cleanup::{Janitor, SweepReport},
    delivery::{Channel, DeliveryPlan, DeliveryRouter},
    error::{Error, ErrorKind, Failure, Result},
    extract::{ExtractError, ExtractOptions, Extractor, MediaMetadata, YtDlp},
    mime::{ContentKind, SourceKind, classify_content_kind, classify_source, infer_extension},
    pipeline::{Orchestrator, Strategies},
    request::{Artifact, RetrievalOutcome, RetrievalRequest},
    store::ArtifactStore,
    strategy::{Requester, Strategy},
};
