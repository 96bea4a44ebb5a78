//! pv-data crate
//!
//! Raw position records as served by the pool subgraph, and the client that
//! fetches them.

pub mod subgraph;
pub mod types;

pub use subgraph::SubgraphClient;
pub use types::{RawPool, RawPosition, RawTick, RawToken};
