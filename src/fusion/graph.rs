//! Pointwise fusion graph
//!
//! A small expression arena describing a computation to be compiled into one
//! fused elementwise kernel: input placeholders, dtype casts, broadcasts, and
//! binary elementwise operations. Dtypes are inferred while building; shapes
//! are bound when the graph is compiled against concrete inputs.

use crate::dtype::DType;
use crate::error::{Error, Result};

/// Handle to a tensor-valued expression in a [`Fusion`]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct TensorId(pub(crate) usize);

/// Binary elementwise operations
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// Elementwise addition
    Add,
    /// Elementwise subtraction
    Sub,
    /// Elementwise multiplication
    Mul,
}

/// Expression forms
#[derive(Clone, Debug)]
pub(crate) enum Expr {
    /// Input placeholder of fixed rank
    Input,
    /// Dtype conversion
    Cast {
        /// Source expression
        src: TensorId,
    },
    /// Axis insertion: `pattern[a]` marks axis `a` of the result as broadcast
    Broadcast {
        /// Source expression
        src: TensorId,
        /// Per-axis broadcast flags, length = result rank
        pattern: Vec<bool>,
    },
    /// Binary elementwise combination
    Binary {
        /// The operation
        op: BinaryOp,
        /// Left operand
        lhs: TensorId,
        /// Right operand
        rhs: TensorId,
    },
}

#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub(crate) expr: Expr,
    pub(crate) dtype: DType,
    pub(crate) rank: usize,
}

/// A fusion graph under construction
///
/// Build with [`make_tensor`](Fusion::make_tensor) /
/// [`add_input`](Fusion::add_input), combine with
/// [`cast`](Fusion::cast) / [`broadcast`](Fusion::broadcast) /
/// [`add`](Fusion::add), and register results with
/// [`add_output`](Fusion::add_output). Compile through
/// [`FusionExecutorCache`](crate::fusion::FusionExecutorCache).
#[derive(Clone, Debug, Default)]
pub struct Fusion {
    nodes: Vec<Node>,
    inputs: Vec<TensorId>,
    outputs: Vec<TensorId>,
}

impl Fusion {
    /// Create an empty fusion graph
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, node: Node) -> TensorId {
        let id = TensorId(self.nodes.len());
        self.nodes.push(node);
        id
    }

    pub(crate) fn node(&self, id: TensorId) -> &Node {
        &self.nodes[id.0]
    }

    /// Create a contiguous input placeholder of the given rank and dtype
    pub fn make_tensor(&mut self, rank: usize, dtype: DType) -> TensorId {
        self.push(Node {
            expr: Expr::Input,
            dtype,
            rank,
        })
    }

    /// Register a placeholder as a graph input
    ///
    /// # Errors
    ///
    /// Returns an error if `id` is not an input placeholder or was already
    /// registered.
    pub fn add_input(&mut self, id: TensorId) -> Result<()> {
        if !matches!(self.node(id).expr, Expr::Input) {
            return Err(Error::invalid_argument(
                "id",
                "only input placeholders can be registered as inputs",
            ));
        }
        if self.inputs.contains(&id) {
            return Err(Error::invalid_argument("id", "input already registered"));
        }
        self.inputs.push(id);
        Ok(())
    }

    /// Register an expression as a graph output
    pub fn add_output(&mut self, id: TensorId) -> Result<()> {
        if id.0 >= self.nodes.len() {
            return Err(Error::invalid_argument("id", "unknown expression"));
        }
        self.outputs.push(id);
        Ok(())
    }

    /// Convert an expression to another dtype
    pub fn cast(&mut self, src: TensorId, to: DType) -> TensorId {
        let rank = self.node(src).rank;
        self.push(Node {
            expr: Expr::Cast { src },
            dtype: to,
            rank,
        })
    }

    /// Insert broadcast axes
    ///
    /// `pattern` has one flag per axis of the result; `true` marks an inserted
    /// broadcast axis. The number of `false` flags must equal the source rank.
    pub fn broadcast(&mut self, src: TensorId, pattern: &[bool]) -> Result<TensorId> {
        let src_rank = self.node(src).rank;
        let non_broadcast = pattern.iter().filter(|&&b| !b).count();
        if non_broadcast != src_rank {
            return Err(Error::InvalidBroadcast {
                pattern: pattern.to_vec(),
                non_broadcast,
                rank: src_rank,
            });
        }
        let dtype = self.node(src).dtype;
        Ok(self.push(Node {
            expr: Expr::Broadcast {
                src,
                pattern: pattern.to_vec(),
            },
            dtype,
            rank: pattern.len(),
        }))
    }

    /// Elementwise addition
    pub fn add(&mut self, lhs: TensorId, rhs: TensorId) -> Result<TensorId> {
        self.binary(BinaryOp::Add, lhs, rhs)
    }

    /// Elementwise subtraction
    pub fn sub(&mut self, lhs: TensorId, rhs: TensorId) -> Result<TensorId> {
        self.binary(BinaryOp::Sub, lhs, rhs)
    }

    /// Elementwise multiplication
    pub fn mul(&mut self, lhs: TensorId, rhs: TensorId) -> Result<TensorId> {
        self.binary(BinaryOp::Mul, lhs, rhs)
    }

    /// Elementwise binary combination
    ///
    /// Operand dtypes and ranks must match; broadcast axes bind to the other
    /// operand's extents when shapes are resolved at compile time.
    pub fn binary(&mut self, op: BinaryOp, lhs: TensorId, rhs: TensorId) -> Result<TensorId> {
        let (l, r) = (self.node(lhs), self.node(rhs));
        if l.dtype != r.dtype {
            return Err(Error::DTypeMismatch {
                lhs: l.dtype,
                rhs: r.dtype,
            });
        }
        if l.rank != r.rank {
            return Err(Error::invalid_argument(
                "rhs",
                format!("rank mismatch: {} vs {}", l.rank, r.rank),
            ));
        }
        let dtype = l.dtype;
        let rank = l.rank;
        Ok(self.push(Node {
            expr: Expr::Binary { op, lhs, rhs },
            dtype,
            rank,
        }))
    }

    /// Registered inputs, in registration order
    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    /// Registered outputs, in registration order
    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }

    /// Dtype of an expression
    pub fn dtype_of(&self, id: TensorId) -> DType {
        self.node(id).dtype
    }

    /// Rank of an expression
    pub fn rank_of(&self, id: TensorId) -> usize {
        self.node(id).rank
    }

    /// Broadcast flags of a broadcast expression, `None` otherwise
    pub fn broadcast_pattern(&self, id: TensorId) -> Option<&[bool]> {
        match &self.node(id).expr {
            Expr::Broadcast { pattern, .. } => Some(pattern),
            _ => None,
        }
    }

    /// Kind of an expression, for graph introspection
    pub fn kind_of(&self, id: TensorId) -> ExprKind {
        match self.node(id).expr {
            Expr::Input => ExprKind::Input,
            Expr::Cast { .. } => ExprKind::Cast,
            Expr::Broadcast { .. } => ExprKind::Broadcast,
            Expr::Binary { .. } => ExprKind::Binary,
        }
    }

    /// Operand expressions an expression reads, in order
    pub fn operands(&self, id: TensorId) -> Vec<TensorId> {
        match self.node(id).expr {
            Expr::Input => vec![],
            Expr::Cast { src } | Expr::Broadcast { src, .. } => vec![src],
            Expr::Binary { lhs, rhs, .. } => vec![lhs, rhs],
        }
    }
}

/// Expression kind tags for graph introspection
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExprKind {
    /// Input placeholder
    Input,
    /// Dtype conversion
    Cast,
    /// Axis insertion
    Broadcast,
    /// Binary elementwise combination
    Binary,
}
