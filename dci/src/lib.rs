//! Prioritized Dynamic Continuous Indexing (DCI): exact k-nearest-neighbour
//! search in high-dimensional Euclidean space.
//!
//! The index trades a small multiplicative factor in memory and
//! construction time for query complexity that is linear in ambient
//! dimensionality and sublinear in intrinsic dimensionality. Four pieces
//! make this work, leaves-first:
//!
//! - [`projection`]: a bank of random unit directions used to collapse
//!   ambient-space points onto one-dimensional subspaces.
//! - [`position`]: per-direction sorted sequences of projected coordinates
//!   (the "simple indices"), searchable by binary lookup.
//! - [`query`]: the prioritized, round-robin, multi-probe traversal that
//!   promotes candidates once every simple index in a composite has
//!   witnessed them, and is the algorithmic core of the data structure.
//! - [`hierarchy`]: an optional coarse-to-fine pyramid of levels that
//!   narrows the eligible point set before the finest-level query runs.
//!
//! [`DciIndex`] ties these together behind the lifecycle `init -> add ->
//! query* -> clear/reset`; dropping an index is `free`.
//!
//! ```
//! use dci::{ConstructionConfig, DciIndex, QueryConfig};
//!
//! let data: Vec<f32> = vec![
//!     0.0, 0.0,
//!     1.0, 0.0,
//!     0.0, 1.0,
//!     1.0, 1.0,
//! ];
//!
//! let mut index = DciIndex::with_seed(2, 2, 2, 0).unwrap();
//! index.add(&data, 4, ConstructionConfig::default()).unwrap();
//!
//! let cfg = QueryConfig::default();
//! let outcome = index.query(&[0.1, 0.1], 1, &cfg).unwrap();
//! assert_eq!(outcome.ids, vec![0]);
//! ```

pub mod config;
pub mod error;
mod hierarchy;
pub mod index;
pub mod position;
pub mod projection;
pub mod query;
pub mod rng;

pub use config::{Builder, ConstructionConfig, QueryConfig, ResolvedCaps};
pub use error::{DciError, Result};
pub use index::{DciIndex, QueryOutcome};
pub use query::PointData;
