//! Reverse-mode gradient propagation
//!
//! Backward rules are written with [`Var`] operations themselves, so when
//! `create_graph` is requested the gradients carry their own history and can
//! be differentiated again.

use super::var::{Op, Var};
use crate::io::error::{Result, TrainingError, shape_mismatch};
use ndarray::ArrayD;
use std::collections::{HashMap, HashSet};

/// Accumulated leaf gradients keyed by node identifier
#[derive(Debug, Default, Clone)]
pub struct Gradients {
    by_node: HashMap<usize, ArrayD<f32>>,
}

impl Gradients {
    /// Create an empty gradient set
    pub fn new() -> Self {
        Self::default()
    }

    /// Gradient recorded for `var`, if it received any
    pub fn get(&self, var: &Var) -> Option<&ArrayD<f32>> {
        self.by_node.get(&var.id())
    }

    /// Number of leaves holding a gradient
    pub fn len(&self) -> usize {
        self.by_node.len()
    }

    /// Whether no gradient has been recorded
    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }

    /// Add another gradient set into this one, summing shared leaves
    ///
    /// # Errors
    ///
    /// Returns an error if a shared leaf has gradients of different shapes
    pub fn accumulate(&mut self, other: Self) -> Result<()> {
        for (id, gradient) in other.by_node {
            if let Some(existing) = self.by_node.get_mut(&id) {
                if existing.shape() != gradient.shape() {
                    return Err(shape_mismatch(
                        "gradient accumulation",
                        existing.shape(),
                        gradient.shape(),
                    ));
                }
                *existing += &gradient;
            } else {
                self.by_node.insert(id, gradient);
            }
        }
        Ok(())
    }
}

/// Gradients of `loss` with respect to every gradient-tracked leaf it depends on
///
/// The seed gradient is a tensor of ones shaped like `loss`.
///
/// # Errors
///
/// Returns an error if `loss` does not depend on any tracked leaf, or if a
/// backward rule meets inconsistent shapes
pub fn backward(loss: &Var) -> Result<Gradients> {
    if !loss.requires_grad() {
        return Err(TrainingError::NotDifferentiable {
            operation: "backward",
        });
    }
    let (order, mut grads) = propagate(loss, false, &HashSet::new())?;

    let mut gradients = Gradients::new();
    for node in order.iter().filter(|n| n.is_leaf()) {
        if let Some(gradient) = grads.remove(&node.id()) {
            gradients.by_node.insert(node.id(), gradient.value().clone());
        }
    }
    Ok(gradients)
}

/// Gradients of `output` with respect to each of `inputs`
///
/// Entries are `None` for inputs that `output` does not depend on. With
/// `create_graph` the returned gradients are themselves differentiable.
///
/// # Errors
///
/// Returns an error if a backward rule meets inconsistent shapes
pub fn grad(output: &Var, inputs: &[&Var], create_graph: bool) -> Result<Vec<Option<Var>>> {
    if !output.requires_grad() {
        return Ok(vec![None; inputs.len()]);
    }
    let keep: HashSet<usize> = inputs.iter().map(|v| v.id()).collect();
    let (_, grads) = propagate(output, create_graph, &keep)?;
    Ok(inputs
        .iter()
        .map(|input| grads.get(&input.id()).cloned())
        .collect())
}

fn propagate(
    root: &Var,
    create_graph: bool,
    keep: &HashSet<usize>,
) -> Result<(Vec<Var>, HashMap<usize, Var>)> {
    let order = topological_order(root);
    let mut grads: HashMap<usize, Var> = HashMap::new();
    grads.insert(
        root.id(),
        Var::constant(ArrayD::ones(root.value().raw_dim())),
    );

    for node in order.iter().rev() {
        let Some(op) = node.op() else {
            continue;
        };
        let upstream = if keep.contains(&node.id()) {
            grads.get(&node.id()).cloned()
        } else {
            // Interior gradients are no longer needed once pushed to the inputs
            grads.remove(&node.id())
        };
        let Some(upstream) = upstream else {
            continue;
        };

        for (parent, contribution) in vector_jacobian(op, node, &upstream, create_graph)? {
            let merged = match grads.remove(&parent.id()) {
                Some(existing) => existing.add(&contribution)?,
                None => contribution,
            };
            grads.insert(parent.id(), merged);
        }
    }

    Ok((order, grads))
}

// Post-order over tracked nodes: every node appears after all of its inputs
fn topological_order(root: &Var) -> Vec<Var> {
    let mut order = Vec::new();
    let mut visited = HashSet::new();
    let mut stack = vec![(root.clone(), false)];

    while let Some((node, expanded)) = stack.pop() {
        if expanded {
            order.push(node);
            continue;
        }
        if !node.requires_grad() || !visited.insert(node.id()) {
            continue;
        }
        stack.push((node.clone(), true));
        if let Some(op) = node.op() {
            for parent in op.parents() {
                if parent.requires_grad() && !visited.contains(&parent.id()) {
                    stack.push((parent.clone(), false));
                }
            }
        }
    }

    order
}

fn vector_jacobian(
    op: &Op,
    output: &Var,
    upstream: &Var,
    create_graph: bool,
) -> Result<Vec<(Var, Var)>> {
    let saved = |v: &Var| if create_graph { v.clone() } else { v.detach() };
    let g = upstream;

    let contributions = match op {
        Op::Add(a, b) => vec![(a, g.clone()), (b, g.clone())],
        Op::Sub(a, b) => vec![(a, g.clone()), (b, g.neg())],
        Op::Mul(a, b) => vec![(a, g.mul(&saved(b))?), (b, g.mul(&saved(a))?)],
        Op::Neg(a) => vec![(a, g.neg())],
        Op::Scale(a, factor) => vec![(a, g.scale(*factor))],
        Op::AddScalar(a) => vec![(a, g.clone())],
        Op::Square(a) => vec![(a, g.mul(&saved(a).scale(2.0))?)],
        Op::Sqrt(a) => vec![(a, g.mul(&saved(output).recip().scale(0.5))?)],
        Op::Recip(a) => vec![(a, g.mul(&saved(output).square().neg())?)],
        Op::Abs(a) => {
            let sign = a.value().mapv(|x| {
                if x > 0.0 {
                    1.0
                } else if x < 0.0 {
                    -1.0
                } else {
                    0.0
                }
            });
            vec![(a, g.mul(&Var::constant(sign))?)]
        }
        Op::Tanh(a) => vec![(a, g.mul(&saved(output).square().neg().add_scalar(1.0))?)],
        Op::LeakyRelu(a, slope) => {
            let slope = *slope;
            let local = a.value().mapv(|x| if x > 0.0 { 1.0 } else { slope });
            vec![(a, g.mul(&Var::constant(local))?)]
        }
        Op::MatMul(a, b) => {
            let grad_a = g.matmul(&saved(b).transpose()?)?;
            let grad_b = saved(a).transpose()?.matmul(g)?;
            vec![(a, grad_a), (b, grad_b)]
        }
        Op::Permute(a, axes) => {
            let mut inverse = vec![0; axes.len()];
            for (position, &axis) in axes.iter().enumerate() {
                if let Some(slot) = inverse.get_mut(axis) {
                    *slot = position;
                }
            }
            vec![(a, g.permute(&inverse)?)]
        }
        Op::Reshape(a) => vec![(a, g.reshape(a.shape())?)],
        Op::BroadcastTo(a) => vec![(a, g.sum_to(a.shape())?)],
        Op::SumTo(a) => vec![(a, g.broadcast_to(a.shape())?)],
        Op::SumAxis(a, axis) => {
            let mut kept = a.shape().to_vec();
            if let Some(dim) = kept.get_mut(*axis) {
                *dim = 1;
            }
            vec![(a, g.reshape(&kept)?.broadcast_to(a.shape())?)]
        }
    };

    Ok(contributions
        .into_iter()
        .filter(|(parent, _)| parent.requires_grad())
        .map(|(parent, gradient)| (parent.clone(), gradient))
        .collect())
}
