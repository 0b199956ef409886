//! Client-side synchronization engine for an admin support-chat console.
//!
//! Keeps a locally held conversation list, the open transcript, and an
//! identity cache consistent with a push transport that delivers partial,
//! out-of-order, and duplicate events, reconciling against periodic REST
//! snapshots.

pub mod cache;
pub mod client;
pub mod error;
pub mod rest;
pub mod snapshot;
pub mod state;
pub mod transport;
pub mod types;

pub use cache::IdentityCache;
pub use client::Client;
pub use error::{ClientError, FetchError, TransportError, ValidationError};
pub use transport::{LocalTransport, Transport, TransportEvent};
