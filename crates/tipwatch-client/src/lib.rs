//! tipwatch-client — read-only client for a Cardano node's REST API.
//!
//! Two calls are exposed, each bounded by a caller-supplied deadline:
//!
//! ```text
//! NodeApi
//!   ├── fetch_tip(deadline)     → GET /api/rest/v0/tip
//!   └── fetch_network(deadline) → GET /api/rest/v0/network
//! ```
//!
//! [`NodeClient`] implements [`NodeApi`] over a plain HTTP/1 connection
//! per request. The collector depends only on the trait so tests can
//! substitute a fake upstream.

pub mod client;
pub mod error;

pub use client::{NETWORK_PATH, NodeApi, NodeClient, TIP_PATH};
pub use error::{ClientError, ClientResult};
