//! Administrative connection queries against broker nodes.
//!
//! The crate defines the transport seam (`AdminTransport`, `AdminSession`), the query
//! shapes a node may accept, the MQSC text protocol shared by the concrete transports,
//! and `AdminQueryClient`, which negotiates the query shape per node and turns raw
//! connection descriptors into `ConnectionRecord`s.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod client;
mod descriptor;
mod error;
pub mod mqsc;
mod request;
mod session;
mod transport;

pub use client::{AdminQueryClient, AdminQueryConfig, ClusterSnapshot};
pub use descriptor::{ConnectionDescriptor, attr};
pub use error::{AdminTransportError, Error, Result};
pub use request::{InquireConnections, QueryShape};
pub use session::SessionGuard;
pub use transport::{AdminSession, AdminTransport, Credentials, NodeAddress};

pub use affinity_model::FailureKind;
