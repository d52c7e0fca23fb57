//! Executor cache keyed by input signature
//!
//! Compiling a fusion is the expensive step; the cache compiles once per
//! concrete input (dtype, shape) signature and reuses the executor on
//! subsequent runs. The most recent run's compile parameters and kernel time
//! are exposed for profiling callers.

use std::collections::HashMap;
use std::time::Duration;

use crate::dtype::DType;
use crate::error::Result;
use crate::fusion::executor::{ExecuteOptions, FusionExecutor, PointwiseParams};
use crate::fusion::graph::Fusion;
use crate::tensor::Tensor;

type Signature = Vec<(DType, Vec<usize>)>;

/// Introspection record for the most recent run
#[derive(Clone, Debug)]
pub struct RunInfo {
    /// Launch geometry, recorded when profiling was requested
    pub pointwise_params: Option<PointwiseParams>,
    /// Fused-loop duration, recorded when measurement was requested
    pub kernel_time: Option<Duration>,
    /// Whether this run compiled a new executor (cache miss)
    pub compiled: bool,
}

/// Compiles and caches [`FusionExecutor`]s per input signature
#[derive(Debug)]
pub struct FusionExecutorCache {
    fusion: Fusion,
    executors: HashMap<Signature, FusionExecutor>,
    last_run: Option<RunInfo>,
}

impl FusionExecutorCache {
    /// Create a cache for one fusion graph
    pub fn new(fusion: Fusion) -> Self {
        Self {
            fusion,
            executors: HashMap::new(),
            last_run: None,
        }
    }

    /// Run the fusion on concrete inputs, compiling on first sight of their
    /// (dtype, shape) signature
    pub fn run_with_inputs(
        &mut self,
        inputs: &[Tensor],
        options: &ExecuteOptions,
    ) -> Result<Vec<Tensor>> {
        let signature: Signature = inputs
            .iter()
            .map(|t| (t.dtype(), t.shape().to_vec()))
            .collect();

        let compiled = !self.executors.contains_key(&signature);
        if compiled {
            let executor = FusionExecutor::compile(&self.fusion, inputs)?;
            self.executors.insert(signature.clone(), executor);
        }
        // Present after the insert above.
        let Some(executor) = self.executors.get_mut(&signature) else {
            unreachable!()
        };

        let outputs = executor.run(inputs, options)?;

        self.last_run = Some(RunInfo {
            pointwise_params: options.profile.then(|| *executor.params()),
            kernel_time: executor.kernel_time(),
            compiled,
        });
        Ok(outputs)
    }

    /// The most recent run's introspection record
    pub fn last_run_info(&self) -> Option<&RunInfo> {
        self.last_run.as_ref()
    }

    /// Number of distinct signatures compiled so far
    pub fn compiled_count(&self) -> usize {
        self.executors.len()
    }

    /// The fusion graph this cache compiles
    pub fn fusion(&self) -> &Fusion {
        &self.fusion
    }
}
