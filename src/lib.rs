//! seisplan - request planning for a distributed seismic cube service
//!
//! The planning core of a query service that stores 3-D seismic volumes as
//! a regular grid of fixed-shape fragments in a blob store. A packed
//! request document goes in; an ordered sequence of packed task
//! descriptors comes out, each naming the fragments one worker should
//! fetch and exactly what to extract from them.
//!
//! # Features
//!
//! - Fragment grid geometry: global/local coordinate conversion, slice
//!   enumeration in lexicographic order
//! - Slice and curtain request kinds
//! - Generic partitioning of fetch plans into equal-prefix work units
//! - Wire codec for the task and descriptor messages shared with routers
//!   and workers
//!
//! The planner is pure: no I/O, no caching, no shared state. Fetching
//! fragments, extraction math, dispatch, and retries all belong to the
//! surrounding service.
//!
//! # Example
//!
//! ```rust,ignore
//! use seisplan::mkschedule;
//!
//! # fn example(doc: &[u8]) -> seisplan::Result<()> {
//! // doc is a packed request produced by the upstream router
//! let tasks = mkschedule(doc, 10)?;
//! for task in &tasks {
//!     // hand each packed descriptor to a worker
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod geometry;
pub mod manifest;
pub mod messages;
pub mod plan;

// Re-exports
pub use error::{PlanError, Result};
pub use geometry::{CubePoint, Dimension, FragmentId, Grid, LocalPoint};
pub use manifest::Manifest;
pub use messages::{
    CurtainFetch, CurtainTask, ProcessHeader, SingleFetch, SliceFetch, SliceTask,
};
pub use plan::{build_curtain, build_slice, mkschedule, partition, plan, Plan, TaskPlan};

/// Version of the planner crate
pub const SEISPLAN_VERSION: &str = env!("CARGO_PKG_VERSION");
