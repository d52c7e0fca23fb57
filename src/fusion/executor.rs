//! Compiling executor for pointwise fusion graphs
//!
//! [`FusionExecutor::compile`] binds a [`Fusion`] to concrete input tensors,
//! verifies the graph is a supported pointwise ladder (per-operand optional
//! cast and broadcast, binary ops in one compute dtype, optional output
//! cast), and plans per-operand strides in the output index space; broadcast
//! axes get stride 0. [`FusionExecutor::run`] then performs a single fused
//! elementwise pass; no intermediate tensors are materialized.

use std::time::{Duration, Instant};

use crate::dispatch_float_dtype;
use crate::dtype::{DType, Element};
use crate::error::{Error, Result};
use crate::fusion::graph::{BinaryOp, Expr, Fusion, TensorId};
use crate::tensor::Tensor;

/// Per-call execution configuration
///
/// Both flags default to off; they are passed explicitly into each run rather
/// than living as mutable state on the executor.
#[derive(Copy, Clone, Debug, Default)]
pub struct ExecuteOptions {
    /// Record compile/launch parameters for introspection
    pub profile: bool,
    /// Measure the duration of the fused loop (kernel time)
    pub measure_kernel_time: bool,
}

/// Launch geometry chosen for a compiled pointwise kernel
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PointwiseParams {
    /// Total output elements
    pub elements: usize,
    /// Elements per parallel block
    pub block_size: usize,
    /// Number of blocks
    pub num_blocks: usize,
}

impl std::fmt::Display for PointwiseParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "pointwise elems={} block={} blocks={}",
            self.elements, self.block_size, self.num_blocks
        )
    }
}

#[derive(Copy, Clone, Debug)]
enum Step {
    /// Push operand `k` for the current element
    Load(usize),
    /// Pop two values, push the combination
    Op(BinaryOp),
}

#[derive(Clone, Debug)]
struct OperandPlan {
    /// Index into the fusion's registered inputs
    input: usize,
    /// Strides in the output index space; 0 on broadcast axes
    strides: Vec<usize>,
}

#[derive(Clone, Debug)]
struct PointwisePlan {
    input_sig: Vec<(DType, Vec<usize>)>,
    out_shape: Vec<usize>,
    out_dtype: DType,
    compute_dtype: DType,
    operands: Vec<OperandPlan>,
    program: Vec<Step>,
    params: PointwiseParams,
}

/// A fusion compiled against one concrete input signature
#[derive(Debug)]
pub struct FusionExecutor {
    plan: PointwisePlan,
    last_kernel_time: Option<Duration>,
}

impl FusionExecutor {
    /// Compile a fusion graph for the given concrete inputs
    ///
    /// # Errors
    ///
    /// Fails on input arity/rank/dtype mismatches, structurally invalid
    /// shapes, or graphs outside the supported pointwise family.
    pub fn compile(fusion: &Fusion, inputs: &[Tensor]) -> Result<Self> {
        if inputs.len() != fusion.inputs().len() {
            return Err(Error::invalid_argument(
                "inputs",
                format!(
                    "fusion has {} inputs, got {}",
                    fusion.inputs().len(),
                    inputs.len()
                ),
            ));
        }

        let mut input_shapes = Vec::with_capacity(inputs.len());
        for (pos, (&tid, tensor)) in fusion.inputs().iter().zip(inputs).enumerate() {
            let expected_rank = fusion.rank_of(tid);
            if tensor.ndim() != expected_rank {
                return Err(Error::invalid_argument(
                    "inputs",
                    format!(
                        "input {} has rank {}, fusion expects rank {}",
                        pos,
                        tensor.ndim(),
                        expected_rank
                    ),
                ));
            }
            if tensor.dtype() != fusion.dtype_of(tid) {
                return Err(Error::DTypeMismatch {
                    lhs: fusion.dtype_of(tid),
                    rhs: tensor.dtype(),
                });
            }
            if !tensor.dtype().is_float() {
                return Err(Error::unsupported_dtype(tensor.dtype(), "fusion input"));
            }
            input_shapes.push(tensor.shape().to_vec());
        }

        let out_id = match fusion.outputs() {
            [single] => *single,
            outs => {
                return Err(Error::unsupported_fusion(format!(
                    "expected exactly one output, got {}",
                    outs.len()
                )))
            }
        };

        // Peel the (single) output cast to find the compute root.
        let mut root = out_id;
        let mut output_casts = 0usize;
        loop {
            match fusion.node(root).expr {
                Expr::Cast { src } => {
                    output_casts += 1;
                    if output_casts > 1 {
                        return Err(Error::unsupported_fusion("more than one output cast"));
                    }
                    root = src;
                }
                _ => break,
            }
        }

        let compute_dtype = fusion.dtype_of(root);
        if !compute_dtype.is_float() {
            return Err(Error::unsupported_dtype(compute_dtype, "fusion compute"));
        }
        let out_dtype = fusion.dtype_of(out_id);
        if !out_dtype.is_float() {
            return Err(Error::unsupported_dtype(out_dtype, "fusion output"));
        }

        let mut lowering = Lowering {
            fusion,
            input_shapes: &input_shapes,
            operands: Vec::new(),
            program: Vec::new(),
        };
        let binding = lowering.lower(root)?;

        let out_shape = binding.shape;
        let params = plan_blocks(out_shape.iter().product());
        let input_sig = inputs
            .iter()
            .map(|t| (t.dtype(), t.shape().to_vec()))
            .collect();

        Ok(Self {
            plan: PointwisePlan {
                input_sig,
                out_shape,
                out_dtype,
                compute_dtype,
                operands: lowering.operands,
                program: lowering.program,
                params,
            },
            last_kernel_time: None,
        })
    }

    /// Execute the compiled kernel
    ///
    /// Inputs must match the signature this executor was compiled for.
    /// Returns the output tensors (one, for the supported graph family).
    pub fn run(&mut self, inputs: &[Tensor], options: &ExecuteOptions) -> Result<Vec<Tensor>> {
        for ((dtype, shape), tensor) in self.plan.input_sig.iter().zip(inputs) {
            if tensor.dtype() != *dtype {
                return Err(Error::DTypeMismatch {
                    lhs: *dtype,
                    rhs: tensor.dtype(),
                });
            }
            if tensor.shape() != shape.as_slice() {
                return Err(Error::shape_mismatch(shape, tensor.shape()));
            }
        }
        if inputs.len() != self.plan.input_sig.len() {
            return Err(Error::invalid_argument(
                "inputs",
                format!(
                    "compiled for {} inputs, got {}",
                    self.plan.input_sig.len(),
                    inputs.len()
                ),
            ));
        }

        let mut out = Tensor::zeros(&self.plan.out_shape, self.plan.out_dtype);

        let loaders: Vec<Loader<'_>> = self
            .plan
            .operands
            .iter()
            .map(|op| Loader::new(&inputs[op.input], &op.strides))
            .collect::<Result<_>>()?;

        let plan = &self.plan;
        let started = Instant::now();
        let dispatched: Result<()> = dispatch_float_dtype!(plan.compute_dtype, C => {
            dispatch_float_dtype!(plan.out_dtype, O => {
                execute_loop::<C, O>(plan, &loaders, out.as_mut_slice::<O>()?);
                Ok(())
            }, "fusion_store")
        }, "fusion_execute");
        dispatched?;

        self.last_kernel_time = if options.measure_kernel_time {
            Some(started.elapsed())
        } else {
            None
        };

        Ok(vec![out])
    }

    /// Launch geometry chosen at compile time
    pub fn params(&self) -> &PointwiseParams {
        &self.plan.params
    }

    /// Duration of the most recent fused loop, when measurement was requested
    pub fn kernel_time(&self) -> Option<Duration> {
        self.last_kernel_time
    }

    /// Output shape this executor produces
    pub fn output_shape(&self) -> &[usize] {
        &self.plan.out_shape
    }

    /// Output dtype this executor produces
    pub fn output_dtype(&self) -> DType {
        self.plan.out_dtype
    }
}

/// Shape binding of an expression: concrete extents plus per-axis broadcast
/// flags (a flagged axis has extent 1 until a binary op binds it).
struct Binding {
    shape: Vec<usize>,
    mask: Vec<bool>,
}

struct Lowering<'a> {
    fusion: &'a Fusion,
    input_shapes: &'a [Vec<usize>],
    operands: Vec<OperandPlan>,
    program: Vec<Step>,
}

impl Lowering<'_> {
    fn lower(&mut self, id: TensorId) -> Result<Binding> {
        match self.fusion.node(id).expr {
            Expr::Binary { op, lhs, rhs } => {
                let lb = self.lower(lhs)?;
                let rb = self.lower(rhs)?;
                let bound = unify(&lb, &rb)?;
                self.program.push(Step::Op(op));
                Ok(bound)
            }
            _ => self.lower_leaf(id),
        }
    }

    /// Lower an input path: `Input`, optionally through one `Cast` and one
    /// `Broadcast` in either order.
    fn lower_leaf(&mut self, id: TensorId) -> Result<Binding> {
        let mut casts = 0usize;
        let mut pattern: Option<Vec<bool>> = None;
        let mut cur = id;
        loop {
            match &self.fusion.node(cur).expr {
                Expr::Cast { src } => {
                    casts += 1;
                    if casts > 1 {
                        return Err(Error::unsupported_fusion(
                            "more than one cast on an input path",
                        ));
                    }
                    cur = *src;
                }
                Expr::Broadcast { src, pattern: p } => {
                    if pattern.replace(p.clone()).is_some() {
                        return Err(Error::unsupported_fusion("nested broadcast"));
                    }
                    cur = *src;
                }
                Expr::Input => break,
                Expr::Binary { .. } => {
                    return Err(Error::unsupported_fusion(
                        "cast or broadcast of a fused binary result",
                    ))
                }
            }
        }

        let pos = self
            .fusion
            .inputs()
            .iter()
            .position(|&i| i == cur)
            .ok_or_else(|| Error::unsupported_fusion("expression reads an unregistered input"))?;

        let in_shape = &self.input_shapes[pos];
        let (shape, mask, strides) = broadcast_layout(in_shape, pattern.as_deref());

        let slot = self.operands.len();
        self.operands.push(OperandPlan {
            input: pos,
            strides,
        });
        self.program.push(Step::Load(slot));
        Ok(Binding { shape, mask })
    }
}

/// Shape, mask, and output-space strides of an input after optional broadcast
fn broadcast_layout(
    in_shape: &[usize],
    pattern: Option<&[bool]>,
) -> (Vec<usize>, Vec<bool>, Vec<usize>) {
    let in_strides = contiguous_strides(in_shape);
    match pattern {
        None => (
            in_shape.to_vec(),
            vec![false; in_shape.len()],
            in_strides,
        ),
        Some(p) => {
            let mut shape = Vec::with_capacity(p.len());
            let mut mask = Vec::with_capacity(p.len());
            let mut strides = Vec::with_capacity(p.len());
            let mut src = 0usize;
            for &flag in p {
                if flag {
                    shape.push(1);
                    mask.push(true);
                    strides.push(0);
                } else {
                    shape.push(in_shape[src]);
                    mask.push(false);
                    strides.push(in_strides[src]);
                    src += 1;
                }
            }
            (shape, mask, strides)
        }
    }
}

fn contiguous_strides(shape: &[usize]) -> Vec<usize> {
    let mut strides = vec![1usize; shape.len()];
    for a in (0..shape.len().saturating_sub(1)).rev() {
        strides[a] = strides[a + 1] * shape[a + 1];
    }
    strides
}

/// Bind two operand shapes: a flagged axis takes the other side's extent;
/// unflagged extents must agree.
fn unify(l: &Binding, r: &Binding) -> Result<Binding> {
    if l.shape.len() != r.shape.len() {
        return Err(Error::shape_mismatch(&l.shape, &r.shape));
    }
    let mut shape = Vec::with_capacity(l.shape.len());
    let mut mask = Vec::with_capacity(l.shape.len());
    for a in 0..l.shape.len() {
        let (extent, flagged) = match (l.mask[a], r.mask[a]) {
            (true, true) => (1, true),
            (true, false) => (r.shape[a], false),
            (false, true) => (l.shape[a], false),
            (false, false) => {
                if l.shape[a] != r.shape[a] {
                    return Err(Error::shape_mismatch(&l.shape, &r.shape));
                }
                (l.shape[a], false)
            }
        };
        shape.push(extent);
        mask.push(flagged);
    }
    Ok(Binding { shape, mask })
}

fn plan_blocks(elements: usize) -> PointwiseParams {
    let threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let block_size = elements.div_ceil(threads * 4).max(1).clamp(1024, 1 << 16);
    let num_blocks = elements.div_ceil(block_size);
    PointwiseParams {
        elements,
        block_size,
        num_blocks,
    }
}

enum LoaderData<'a> {
    F64(&'a [f64]),
    F32(&'a [f32]),
    F16(&'a [half::f16]),
    Bf16(&'a [half::bf16]),
}

/// Strided, dtype-erased reader over one operand
struct Loader<'a> {
    data: LoaderData<'a>,
    strides: &'a [usize],
}

impl<'a> Loader<'a> {
    fn new(tensor: &'a Tensor, strides: &'a [usize]) -> Result<Self> {
        let data = match tensor.dtype() {
            DType::F64 => LoaderData::F64(tensor.as_slice()?),
            DType::F32 => LoaderData::F32(tensor.as_slice()?),
            DType::F16 => LoaderData::F16(tensor.as_slice()?),
            DType::BF16 => LoaderData::Bf16(tensor.as_slice()?),
            other => return Err(Error::unsupported_dtype(other, "fusion operand")),
        };
        Ok(Self { data, strides })
    }

    #[inline]
    fn load<C: Element>(&self, idx: &[usize]) -> C {
        let mut offset = 0usize;
        for (i, s) in idx.iter().zip(self.strides) {
            offset += i * s;
        }
        let v = match self.data {
            LoaderData::F64(d) => d[offset],
            LoaderData::F32(d) => d[offset].to_f64(),
            LoaderData::F16(d) => d[offset].to_f64(),
            LoaderData::Bf16(d) => d[offset].to_f64(),
        };
        C::from_f64(v)
    }
}

fn unravel_index(mut linear: usize, shape: &[usize]) -> Vec<usize> {
    let mut idx = vec![0usize; shape.len()];
    for a in (0..shape.len()).rev() {
        if shape[a] > 0 {
            idx[a] = linear % shape[a];
            linear /= shape[a];
        }
    }
    idx
}

#[inline]
fn advance_index(idx: &mut [usize], shape: &[usize]) {
    for a in (0..shape.len()).rev() {
        idx[a] += 1;
        if idx[a] < shape[a] {
            return;
        }
        idx[a] = 0;
    }
}

fn execute_loop<C: Element, O: Element>(
    plan: &PointwisePlan,
    loaders: &[Loader<'_>],
    out: &mut [O],
) {
    let shape = &plan.out_shape;
    let block = plan.params.block_size.max(1);

    let run_block = |start: usize, chunk: &mut [O]| {
        let mut idx = unravel_index(start, shape);
        let mut stack: Vec<C> = Vec::with_capacity(plan.program.len());
        for slot in chunk.iter_mut() {
            stack.clear();
            for step in &plan.program {
                match *step {
                    Step::Load(k) => stack.push(loaders[k].load::<C>(&idx)),
                    Step::Op(op) => {
                        let (Some(r), Some(l)) = (stack.pop(), stack.pop()) else {
                            unreachable!("malformed pointwise program");
                        };
                        stack.push(match op {
                            BinaryOp::Add => l + r,
                            BinaryOp::Sub => l - r,
                            BinaryOp::Mul => l * r,
                        });
                    }
                }
            }
            let Some(value) = stack.pop() else {
                unreachable!("empty pointwise program");
            };
            *slot = O::from_f64(value.to_f64());
            advance_index(&mut idx, shape);
        }
    };

    #[cfg(feature = "rayon")]
    {
        use rayon::prelude::*;
        out.par_chunks_mut(block)
            .enumerate()
            .for_each(|(i, chunk)| run_block(i * block, chunk));
    }
    #[cfg(not(feature = "rayon"))]
    {
        for (i, chunk) in out.chunks_mut(block).enumerate() {
            run_block(i * block, chunk);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn broadcast_add_graph(dtype: DType, axis: usize) -> Fusion {
        let mut fusion = Fusion::new();
        let tv0 = fusion.make_tensor(2, dtype);
        let tv1 = fusion.make_tensor(1, dtype);
        fusion.add_input(tv0).unwrap();
        fusion.add_input(tv1).unwrap();
        let mut pattern = [false, false];
        pattern[axis] = true;
        let tv2 = fusion.broadcast(tv1, &pattern).unwrap();
        let tv3 = fusion.add(tv0, tv2).unwrap();
        fusion.add_output(tv3).unwrap();
        fusion
    }

    #[test]
    fn test_broadcast_add_inner_axis() {
        let fusion = broadcast_add_graph(DType::F32, 1);
        // t0: [[0, 1, 2], [3, 4, 5]], t1 broadcast along axis 1 -> per-row offsets
        let t0 = Tensor::from_slice(&[0.0f32, 1.0, 2.0, 3.0, 4.0, 5.0], &[2, 3]);
        let t1 = Tensor::from_slice(&[10.0f32, 20.0], &[2]);
        let mut exec = FusionExecutor::compile(&fusion, &[t0.clone(), t1.clone()]).unwrap();
        let out = exec
            .run(&[t0, t1], &ExecuteOptions::default())
            .unwrap()
            .remove(0);
        assert_eq!(out.shape(), &[2, 3]);
        assert_eq!(
            out.to_vec::<f32>().unwrap(),
            vec![10.0, 11.0, 12.0, 23.0, 24.0, 25.0]
        );
    }

    #[test]
    fn test_broadcast_add_outer_axis() {
        let fusion = broadcast_add_graph(DType::F32, 0);
        let t0 = Tensor::from_slice(&[0.0f32, 1.0, 2.0, 3.0, 4.0, 5.0], &[2, 3]);
        let t1 = Tensor::from_slice(&[10.0f32, 20.0, 30.0], &[3]);
        let mut exec = FusionExecutor::compile(&fusion, &[t0.clone(), t1.clone()]).unwrap();
        let out = exec
            .run(&[t0, t1], &ExecuteOptions::default())
            .unwrap()
            .remove(0);
        assert_eq!(
            out.to_vec::<f32>().unwrap(),
            vec![10.0, 21.0, 32.0, 13.0, 24.0, 35.0]
        );
    }

    #[test]
    fn test_extent_mismatch_fails_compile() {
        let fusion = broadcast_add_graph(DType::F32, 1);
        let t0 = Tensor::zeros(&[2, 3], DType::F32);
        let t1 = Tensor::zeros(&[3], DType::F32); // must be 2 to bind axis 0
        let err = FusionExecutor::compile(&fusion, &[t0, t1]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_kernel_time_only_when_requested() {
        let fusion = broadcast_add_graph(DType::F32, 1);
        let t0 = Tensor::zeros(&[4, 4], DType::F32);
        let t1 = Tensor::zeros(&[4], DType::F32);
        let mut exec = FusionExecutor::compile(&fusion, &[t0.clone(), t1.clone()]).unwrap();

        exec.run(&[t0.clone(), t1.clone()], &ExecuteOptions::default())
            .unwrap();
        assert!(exec.kernel_time().is_none());

        let options = ExecuteOptions {
            measure_kernel_time: true,
            ..Default::default()
        };
        exec.run(&[t0, t1], &options).unwrap();
        assert!(exec.kernel_time().is_some());
    }

    #[test]
    fn test_complex_compute_rejected() {
        let mut fusion = Fusion::new();
        let a = fusion.make_tensor(1, DType::Complex64);
        fusion.add_input(a).unwrap();
        fusion.add_output(a).unwrap();
        let t = Tensor::zeros(&[4], DType::Complex64);
        let err = FusionExecutor::compile(&fusion, &[t]).unwrap_err();
        assert!(matches!(err, Error::UnsupportedDType { .. }));
    }
}
