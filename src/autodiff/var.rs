//! Graph nodes and differentiable tensor operations

use crate::io::error::{Result, computation_error, invalid_parameter, shape_mismatch};
use ndarray::{ArrayD, ArrayView2, Axis, Ix2, IxDyn};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

static NEXT_NODE_ID: AtomicUsize = AtomicUsize::new(0);

/// Operation that produced a node, holding its inputs
pub(crate) enum Op {
    Add(Var, Var),
    Sub(Var, Var),
    Mul(Var, Var),
    Neg(Var),
    Scale(Var, f32),
    AddScalar(Var),
    Square(Var),
    Sqrt(Var),
    Recip(Var),
    Abs(Var),
    Tanh(Var),
    LeakyRelu(Var, f32),
    MatMul(Var, Var),
    Permute(Var, Vec<usize>),
    Reshape(Var),
    BroadcastTo(Var),
    SumTo(Var),
    SumAxis(Var, usize),
}

impl Op {
    pub(crate) fn parents(&self) -> Vec<&Var> {
        match self {
            Self::Add(a, b) | Self::Sub(a, b) | Self::Mul(a, b) | Self::MatMul(a, b) => {
                vec![a, b]
            }
            Self::Neg(a)
            | Self::Scale(a, _)
            | Self::AddScalar(a)
            | Self::Square(a)
            | Self::Sqrt(a)
            | Self::Recip(a)
            | Self::Abs(a)
            | Self::Tanh(a)
            | Self::LeakyRelu(a, _)
            | Self::Permute(a, _)
            | Self::Reshape(a)
            | Self::BroadcastTo(a)
            | Self::SumTo(a)
            | Self::SumAxis(a, _) => vec![a],
        }
    }
}

struct Node {
    id: usize,
    value: ArrayD<f32>,
    op: Option<Op>,
    requires_grad: bool,
}

/// Immutable tensor value participating in a computation graph
///
/// Cloning is cheap: clones share the same node. A node records the
/// operation that produced it only when at least one input requires
/// gradients, so graphs built purely from constants carry no history.
#[derive(Clone)]
pub struct Var(Rc<Node>);

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Var")
            .field("id", &self.0.id)
            .field("shape", &self.shape())
            .field("requires_grad", &self.0.requires_grad)
            .finish()
    }
}

impl Var {
    fn new(value: ArrayD<f32>, op: Option<Op>, requires_grad: bool) -> Self {
        Self(Rc::new(Node {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            value,
            op,
            requires_grad,
        }))
    }

    fn from_op(value: ArrayD<f32>, op: Op) -> Self {
        let requires_grad = op.parents().iter().any(|p| p.requires_grad());
        if requires_grad {
            Self::new(value, Some(op), true)
        } else {
            Self::new(value, None, false)
        }
    }

    /// Graph leaf, optionally tracked for gradients
    pub fn leaf(value: ArrayD<f32>, requires_grad: bool) -> Self {
        Self::new(value, None, requires_grad)
    }

    /// Untracked value
    pub fn constant(value: ArrayD<f32>) -> Self {
        Self::new(value, None, false)
    }

    /// Zero-dimensional untracked value
    pub fn scalar(value: f32) -> Self {
        Self::constant(ArrayD::from_elem(IxDyn(&[]), value))
    }

    /// Unique identifier of this node
    pub fn id(&self) -> usize {
        self.0.id
    }

    /// Underlying tensor
    pub fn value(&self) -> &ArrayD<f32> {
        &self.0.value
    }

    /// Tensor dimensions
    pub fn shape(&self) -> &[usize] {
        self.0.value.shape()
    }

    /// Whether gradients flow into this node
    pub fn requires_grad(&self) -> bool {
        self.0.requires_grad
    }

    /// Whether this node is a graph input rather than an operation result
    pub fn is_leaf(&self) -> bool {
        self.0.op.is_none()
    }

    pub(crate) fn op(&self) -> Option<&Op> {
        self.0.op.as_ref()
    }

    /// Copy of the value with no graph history
    pub fn detach(&self) -> Self {
        Self::constant(self.0.value.clone())
    }

    /// Extract the only element of a single-element tensor
    ///
    /// # Errors
    ///
    /// Returns an error if the tensor does not contain exactly one element
    pub fn item(&self) -> Result<f32> {
        if self.0.value.len() != 1 {
            return Err(shape_mismatch("item", &[], self.shape()));
        }
        self.0
            .value
            .iter()
            .next()
            .copied()
            .ok_or_else(|| computation_error("item", &"empty tensor"))
    }

    fn ensure_same_shape(&self, operation: &'static str, other: &Self) -> Result<()> {
        if self.shape() == other.shape() {
            Ok(())
        } else {
            Err(shape_mismatch(operation, self.shape(), other.shape()))
        }
    }

    /// Elementwise sum of two tensors of identical shape
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes differ
    pub fn add(&self, other: &Self) -> Result<Self> {
        self.ensure_same_shape("add", other)?;
        let value = self.value() + other.value();
        Ok(Self::from_op(value, Op::Add(self.clone(), other.clone())))
    }

    /// Elementwise difference of two tensors of identical shape
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes differ
    pub fn sub(&self, other: &Self) -> Result<Self> {
        self.ensure_same_shape("sub", other)?;
        let value = self.value() - other.value();
        Ok(Self::from_op(value, Op::Sub(self.clone(), other.clone())))
    }

    /// Elementwise product of two tensors of identical shape
    ///
    /// # Errors
    ///
    /// Returns an error if the shapes differ
    pub fn mul(&self, other: &Self) -> Result<Self> {
        self.ensure_same_shape("mul", other)?;
        let value = self.value() * other.value();
        Ok(Self::from_op(value, Op::Mul(self.clone(), other.clone())))
    }

    /// Elementwise negation
    pub fn neg(&self) -> Self {
        Self::from_op(self.value().mapv(|x| -x), Op::Neg(self.clone()))
    }

    /// Multiply every element by a constant
    pub fn scale(&self, factor: f32) -> Self {
        Self::from_op(
            self.value().mapv(|x| x * factor),
            Op::Scale(self.clone(), factor),
        )
    }

    /// Add a constant to every element
    pub fn add_scalar(&self, offset: f32) -> Self {
        Self::from_op(self.value().mapv(|x| x + offset), Op::AddScalar(self.clone()))
    }

    /// Elementwise square
    pub fn square(&self) -> Self {
        Self::from_op(self.value().mapv(|x| x * x), Op::Square(self.clone()))
    }

    /// Elementwise square root
    pub fn sqrt(&self) -> Self {
        Self::from_op(self.value().mapv(f32::sqrt), Op::Sqrt(self.clone()))
    }

    /// Elementwise reciprocal
    pub fn recip(&self) -> Self {
        Self::from_op(self.value().mapv(f32::recip), Op::Recip(self.clone()))
    }

    /// Elementwise absolute value
    pub fn abs(&self) -> Self {
        Self::from_op(self.value().mapv(f32::abs), Op::Abs(self.clone()))
    }

    /// Elementwise hyperbolic tangent
    pub fn tanh(&self) -> Self {
        Self::from_op(self.value().mapv(f32::tanh), Op::Tanh(self.clone()))
    }

    /// Leaky rectifier with the given negative slope
    pub fn leaky_relu(&self, slope: f32) -> Self {
        Self::from_op(
            self.value().mapv(|x| if x > 0.0 { x } else { slope * x }),
            Op::LeakyRelu(self.clone(), slope),
        )
    }

    /// Matrix product of two rank-2 tensors
    ///
    /// # Errors
    ///
    /// Returns an error if either operand is not rank 2 or the inner dimensions differ
    pub fn matmul(&self, other: &Self) -> Result<Self> {
        let lhs = as_matrix(self.value())?;
        let rhs = as_matrix(other.value())?;
        if lhs.ncols() != rhs.nrows() {
            return Err(shape_mismatch(
                "matmul",
                &[lhs.ncols(), rhs.ncols()],
                other.shape(),
            ));
        }
        let value = lhs.dot(&rhs).into_dyn();
        Ok(Self::from_op(value, Op::MatMul(self.clone(), other.clone())))
    }

    /// Swap the two axes of a rank-2 tensor
    ///
    /// # Errors
    ///
    /// Returns an error if the tensor is not rank 2
    pub fn transpose(&self) -> Result<Self> {
        if self.value().ndim() != 2 {
            return Err(shape_mismatch("transpose", &[0, 0], self.shape()));
        }
        self.permute(&[1, 0])
    }

    /// Reorder axes; `axes[i]` names the source axis placed at position `i`
    ///
    /// # Errors
    ///
    /// Returns an error if `axes` is not a permutation of the tensor's axes
    pub fn permute(&self, axes: &[usize]) -> Result<Self> {
        let ndim = self.value().ndim();
        let mut seen = vec![false; ndim];
        for &axis in axes {
            match seen.get_mut(axis) {
                Some(flag) if !*flag => *flag = true,
                _ => return Err(invalid_parameter("axes", &format!("{axes:?}"), &"not a permutation")),
            }
        }
        if axes.len() != ndim {
            return Err(invalid_parameter(
                "axes",
                &format!("{axes:?}"),
                &format!("expected {ndim} axes"),
            ));
        }
        let value = self
            .value()
            .view()
            .permuted_axes(axes.to_vec())
            .as_standard_layout()
            .into_owned();
        Ok(Self::from_op(value, Op::Permute(self.clone(), axes.to_vec())))
    }

    /// Reinterpret the elements, in row-major order, with a new shape
    ///
    /// # Errors
    ///
    /// Returns an error if the element counts differ
    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        if shape.iter().product::<usize>() != self.value().len() {
            return Err(shape_mismatch("reshape", shape, self.shape()));
        }
        let value = self
            .value()
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order(shape.to_vec())
            .map_err(|e| computation_error("reshape", &e))?;
        Ok(Self::from_op(value, Op::Reshape(self.clone())))
    }

    /// Repeat size-1 and missing leading axes up to `shape`
    ///
    /// # Errors
    ///
    /// Returns an error if the tensor cannot be broadcast to `shape`
    pub fn broadcast_to(&self, shape: &[usize]) -> Result<Self> {
        let value = self
            .value()
            .broadcast(shape.to_vec())
            .ok_or_else(|| shape_mismatch("broadcast_to", shape, self.shape()))?
            .to_owned();
        Ok(Self::from_op(value, Op::BroadcastTo(self.clone())))
    }

    /// Sum over broadcast axes so the result has `shape`
    ///
    /// # Errors
    ///
    /// Returns an error if `shape` does not broadcast to this tensor's shape
    pub fn sum_to(&self, shape: &[usize]) -> Result<Self> {
        let value = reduce_to(self.value(), shape)
            .ok_or_else(|| shape_mismatch("sum_to", shape, self.shape()))?;
        Ok(Self::from_op(value, Op::SumTo(self.clone())))
    }

    /// Sum along one axis, removing it
    ///
    /// # Errors
    ///
    /// Returns an error if `axis` is out of range
    pub fn sum_axis(&self, axis: usize) -> Result<Self> {
        if axis >= self.value().ndim() {
            return Err(invalid_parameter(
                "axis",
                &axis,
                &format!("tensor has {} axes", self.value().ndim()),
            ));
        }
        let value = self.value().sum_axis(Axis(axis));
        Ok(Self::from_op(value, Op::SumAxis(self.clone(), axis)))
    }

    /// Sum of all elements as a zero-dimensional tensor
    ///
    /// # Errors
    ///
    /// Returns an error if the internal reshape fails
    pub fn sum(&self) -> Result<Self> {
        self.reshape(&[self.value().len()])?.sum_axis(0)
    }

    /// Mean of all elements as a zero-dimensional tensor
    ///
    /// # Errors
    ///
    /// Returns an error if the tensor is empty
    pub fn mean(&self) -> Result<Self> {
        let count = self.value().len();
        if count == 0 {
            return Err(computation_error("mean", &"empty tensor"));
        }
        Ok(self.sum()?.scale(1.0 / count as f32))
    }
}

fn as_matrix(value: &ArrayD<f32>) -> Result<ArrayView2<'_, f32>> {
    value
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| shape_mismatch("matmul", &[0, 0], value.shape()))
}

/// Sum `value` down to `target`, the inverse of broadcasting `target` up to `value`
pub(crate) fn reduce_to(value: &ArrayD<f32>, target: &[usize]) -> Option<ArrayD<f32>> {
    if target.len() > value.ndim() {
        return None;
    }
    let mut out = value.clone();
    for _ in 0..value.ndim() - target.len() {
        out = out.sum_axis(Axis(0));
    }
    for (axis, &dim) in target.iter().enumerate() {
        let current = *out.shape().get(axis)?;
        if dim == current {
            continue;
        }
        if dim != 1 {
            return None;
        }
        out = out.sum_axis(Axis(axis)).insert_axis(Axis(axis));
    }
    Some(out)
}
