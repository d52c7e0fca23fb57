//! Benchmark harness for the broadcast + add fusion
//!
//! A [`BroadcastCase`] fixes one (dtype, broadcast-axis, sizes) configuration
//! of the canonical pointwise graph: broadcast a rank-1 operand across one
//! axis of a rank-2 operand and add. Reduced-precision dtypes are widened to
//! `F32` around the add and narrowed back at the output.
//!
//! A case runs as a small state machine: graph build, one warm-compile run
//! with profiling enabled (capturing the launch-parameter label), then a
//! steady-state loop that measures per-iteration kernel time with an explicit
//! cache flush between iterations. Any compile or execute failure is fatal to
//! the case and propagates; nothing is retried.

use std::sync::atomic::{fence, Ordering};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

use crate::dispatch_float_dtype;
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::fusion::{ExecuteOptions, Fusion, FusionExecutorCache};
use crate::tensor::Tensor;

/// Input RNG seed, fixed so every run of a case sees the same data
const CASE_SEED: u64 = 0;

/// Build the broadcast + add fusion graph
///
/// Two inputs (rank 2 and rank 1); the rank-1 input is broadcast with
/// `pattern[bcast_axis] = true` and added to the rank-2 input. For
/// reduced-precision dtypes both inputs are widen-cast to `F32` immediately
/// after ingestion and the sum is narrow-cast back immediately before output
/// registration.
pub fn setup_broadcast(dtype: DType, bcast_axis: usize) -> Result<Fusion> {
    if bcast_axis > 1 {
        return Err(Error::InvalidAxis {
            axis: bcast_axis,
            rank: 2,
        });
    }

    let reduced = dtype.is_reduced_precision();
    let mut fusion = Fusion::new();

    let mut tv0 = fusion.make_tensor(2, dtype);
    let mut tv1 = fusion.make_tensor(1, dtype);
    fusion.add_input(tv0)?;
    fusion.add_input(tv1)?;

    let mut pattern = [false, false];
    pattern[bcast_axis] = true;

    if reduced {
        tv0 = fusion.cast(tv0, DType::F32);
        tv1 = fusion.cast(tv1, DType::F32);
    }

    let tv2 = fusion.broadcast(tv1, &pattern)?;
    let mut tv3 = fusion.add(tv0, tv2)?;

    if reduced {
        tv3 = fusion.cast(tv3, dtype);
    }

    fusion.add_output(tv3)?;
    Ok(fusion)
}

/// Fill a tensor with standard-normal samples
pub fn randn_tensor(shape: &[usize], dtype: DType, rng: &mut StdRng) -> Result<Tensor> {
    let numel: usize = shape.iter().product();
    dispatch_float_dtype!(dtype, T => {
        let data: Vec<T> = (0..numel)
            .map(|_| T::from_f64(StandardNormal.sample(rng)))
            .collect();
        Ok(Tensor::from_slice(&data, shape))
    }, "randn_tensor")
}

/// One benchmark configuration of the broadcast + add graph
#[derive(Copy, Clone, Debug)]
pub struct BroadcastCase {
    /// Element dtype of both inputs and the output
    pub dtype: DType,
    /// Which axis of the rank-2 operand the rank-1 operand broadcasts across
    pub bcast_axis: usize,
    /// Extent of the broadcast axis
    pub bcast_size: usize,
    /// Extent of the iterated (non-broadcast) axis
    pub iter_size: usize,
}

impl BroadcastCase {
    /// Shape of the rank-2 input for this configuration
    pub fn t0_shape(&self) -> [usize; 2] {
        if self.bcast_axis == 1 {
            [self.iter_size, self.bcast_size]
        } else {
            [self.bcast_size, self.iter_size]
        }
    }

    /// Bytes touched by one iteration: both elements of the rank-2 operand
    /// are read and written once, the rank-1 operand is read once
    pub fn bytes_per_iteration(&self) -> u64 {
        let elements = (self.iter_size * self.bcast_size * 2 + self.iter_size) as u64;
        elements * self.dtype.size_in_bytes() as u64
    }

    /// Bytes touched by `iterations` steady-state iterations
    pub fn bytes_processed(&self, iterations: u64) -> u64 {
        iterations * self.bytes_per_iteration()
    }

    /// Build the graph, generate inputs, and warm-compile
    ///
    /// The warm run executes with profiling enabled; the captured launch
    /// parameters become the session label.
    pub fn session(&self) -> Result<CaseSession> {
        let fusion = setup_broadcast(self.dtype, self.bcast_axis)?;
        let mut cache = FusionExecutorCache::new(fusion);

        let mut rng = StdRng::seed_from_u64(CASE_SEED);
        let t0 = randn_tensor(&self.t0_shape(), self.dtype, &mut rng)?;
        let t1 = randn_tensor(&[self.iter_size], self.dtype, &mut rng)?;
        let inputs = vec![t0, t1];

        let warm = ExecuteOptions {
            profile: true,
            measure_kernel_time: false,
        };
        cache.run_with_inputs(&inputs, &warm)?;
        let label = cache
            .last_run_info()
            .and_then(|info| info.pointwise_params)
            .ok_or_else(|| Error::Internal("warm-compile recorded no parameters".into()))?
            .to_string();

        // Order the timing loop against the warm-up work.
        fence(Ordering::SeqCst);

        Ok(CaseSession {
            cache,
            inputs,
            label,
            flush: CacheFlush::new(),
            bytes_per_iteration: self.bytes_per_iteration(),
        })
    }

    /// Run the full case: warm-compile, then `iterations` timed steps
    pub fn run(&self, iterations: usize) -> Result<CaseReport> {
        let mut session = self.session()?;
        let mut kernel_times = Vec::with_capacity(iterations);
        for _ in 0..iterations {
            kernel_times.push(session.step()?);
        }
        fence(Ordering::SeqCst);

        Ok(CaseReport {
            label: session.label,
            kernel_times,
            bytes_processed: self.bytes_processed(iterations as u64),
        })
    }
}

/// A warm-compiled case ready for steady-state timing
pub struct CaseSession {
    cache: FusionExecutorCache,
    inputs: Vec<Tensor>,
    label: String,
    flush: CacheFlush,
    bytes_per_iteration: u64,
}

impl CaseSession {
    /// One timed iteration: execute with kernel-time measurement, then flush
    /// caches so the next iteration does not start warm
    pub fn step(&mut self) -> Result<Duration> {
        let options = ExecuteOptions {
            profile: false,
            measure_kernel_time: true,
        };
        self.cache.run_with_inputs(&self.inputs, &options)?;
        let kernel_time = self
            .cache
            .last_run_info()
            .and_then(|info| info.kernel_time)
            .ok_or_else(|| Error::Internal("kernel time was not measured".into()))?;
        self.flush.flush();
        Ok(kernel_time)
    }

    /// Launch-parameter label captured at warm-compile
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Bytes touched per iteration for throughput reporting
    pub fn bytes_per_iteration(&self) -> u64 {
        self.bytes_per_iteration
    }
}

/// Aggregated result of one benchmark case
#[derive(Clone, Debug)]
pub struct CaseReport {
    /// Launch-parameter label from the warm-compile
    pub label: String,
    /// Measured kernel time of each steady-state iteration
    pub kernel_times: Vec<Duration>,
    /// Total bytes touched, from the case formula
    pub bytes_processed: u64,
}

impl CaseReport {
    /// Number of timed iterations
    pub fn iterations(&self) -> usize {
        self.kernel_times.len()
    }

    /// Sum of measured kernel times
    pub fn total_kernel_time(&self) -> Duration {
        self.kernel_times.iter().sum()
    }

    /// Bytes per second over measured kernel time
    ///
    /// Infinite when the total measured time is zero.
    pub fn throughput_bytes_per_sec(&self) -> f64 {
        self.bytes_processed as f64 / self.total_kernel_time().as_secs_f64()
    }
}

/// Flush buffer size: past the last-level cache of current hardware
const FLUSH_BYTES: usize = 64 << 20;

/// Write-sweeps a large buffer between timed iterations
///
/// The CPU-backend stand-in for a device L2 clear: evicts the benchmark's
/// working set from the cache hierarchy so iterations do not measure a warm
/// cache.
pub struct CacheFlush {
    buf: Vec<u8>,
    stamp: u8,
}

impl CacheFlush {
    /// Allocate the flush buffer
    pub fn new() -> Self {
        Self {
            buf: vec![0u8; FLUSH_BYTES],
            stamp: 0,
        }
    }

    /// Write through the whole buffer
    pub fn flush(&mut self) {
        self.stamp = self.stamp.wrapping_add(1);
        let stamp = self.stamp;
        for byte in self.buf.iter_mut() {
            *byte = stamp;
        }
        std::hint::black_box(&mut self.buf);
    }
}

impl Default for CacheFlush {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fusion::ExprKind;

    #[test]
    fn test_bytes_formula() {
        let case = BroadcastCase {
            dtype: DType::F32,
            bcast_axis: 0,
            bcast_size: 160,
            iter_size: 1024,
        };
        // iterations × (iter × bcast × 2 + iter) × sizeof(dtype)
        assert_eq!(
            case.bytes_processed(10),
            10 * (1024 * 160 * 2 + 1024) * 4
        );
    }

    #[test]
    fn test_t0_shape_follows_axis() {
        let mut case = BroadcastCase {
            dtype: DType::F32,
            bcast_axis: 0,
            bcast_size: 8,
            iter_size: 3,
        };
        assert_eq!(case.t0_shape(), [8, 3]);
        case.bcast_axis = 1;
        assert_eq!(case.t0_shape(), [3, 8]);
    }

    #[test]
    fn test_setup_invalid_axis() {
        let err = setup_broadcast(DType::F32, 2).unwrap_err();
        assert!(matches!(err, Error::InvalidAxis { axis: 2, rank: 2 }));
    }

    #[test]
    fn test_half_graph_wraps_add_in_casts() {
        let fusion = setup_broadcast(DType::F16, 0).unwrap();
        let out = fusion.outputs()[0];
        // Narrow cast back to the input dtype right before the output.
        assert_eq!(fusion.kind_of(out), ExprKind::Cast);
        assert_eq!(fusion.dtype_of(out), DType::F16);

        let add = fusion.operands(out)[0];
        assert_eq!(fusion.kind_of(add), ExprKind::Binary);
        assert_eq!(fusion.dtype_of(add), DType::F32);

        // Both add operands trace back through widen casts.
        let [lhs, rhs] = [fusion.operands(add)[0], fusion.operands(add)[1]];
        assert_eq!(fusion.kind_of(lhs), ExprKind::Cast);
        assert_eq!(fusion.kind_of(rhs), ExprKind::Broadcast);
        let bcast_src = fusion.operands(rhs)[0];
        assert_eq!(fusion.kind_of(bcast_src), ExprKind::Cast);
        assert_eq!(fusion.dtype_of(bcast_src), DType::F32);
    }

    #[test]
    fn test_full_precision_graph_has_no_casts() {
        let fusion = setup_broadcast(DType::F32, 1);
        let fusion = fusion.unwrap();
        let out = fusion.outputs()[0];
        assert_eq!(fusion.kind_of(out), ExprKind::Binary);
        assert_eq!(fusion.dtype_of(out), DType::F32);
    }
}
