//! Pointwise kernel fusion
//!
//! A computation-graph builder ([`Fusion`]), a compiling executor that lowers
//! a supported graph to one fused elementwise pass ([`FusionExecutor`]), and
//! an executor cache keyed by the concrete input signature
//! ([`FusionExecutorCache`]).
//!
//! The supported graph family is the pointwise ladder: inputs, at most one
//! cast and one broadcast per input path, binary elementwise ops in a single
//! compute dtype, and at most one cast before the registered output. Graphs
//! outside this family fail to compile with a descriptive error.

mod cache;
mod executor;
pub(crate) mod graph;

pub use cache::{FusionExecutorCache, RunInfo};
pub use executor::{ExecuteOptions, FusionExecutor, PointwiseParams};
pub use graph::{BinaryOp, ExprKind, Fusion, TensorId};
