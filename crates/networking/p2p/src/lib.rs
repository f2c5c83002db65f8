//! # bdp-download
//!
//! The block download pipeline: given a pool of remote peers, obtains the
//! canonical sequence of block headers and bodies, validates them, and
//! delivers them to an embedding node through the [`sinks::PipelineSinks`]
//! trait. See `SPEC_FULL.md` at the workspace root for the full design.

pub mod body_loop;
pub mod config;
pub mod error;
pub mod header_loop;
pub mod latch;
pub mod metrics;
pub mod peer;
pub mod pipeline;
pub mod queue;
pub mod request;
pub mod sinks;
pub mod validator;
pub mod wrapper;

pub use config::PipelineConfig;
pub use error::{PeerTransportError, PipelineError, SyncQueueError};
pub use metrics::{AtomicMetrics, Metrics, NoopMetrics};
pub use peer::{PeerHandle, PeerId, PeerPool};
pub use pipeline::{Pipeline, PipelineMode};
pub use queue::SyncQueue;
pub use request::{BlocksRequest, HeadersRequest, MAX_IN_REQUEST};
pub use sinks::PipelineSinks;
pub use validator::{AcceptAllValidator, HeaderValidationError, HeaderValidator};
pub use wrapper::{BlockWrapper, HeaderWrapper};
