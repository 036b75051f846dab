// Copyright 2025 the Canopy Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rules: computed attributes with dynamically discovered dependencies.

use alloc::boxed::Box;
use core::any::Any;

use crate::attribute::{Attribute, WeakAttribute};
use crate::graph::Graph;
use crate::seed::VersionSeed;

/// A computed attribute body.
///
/// A rule produces its attribute's value on demand. Dependencies are not
/// declared up front: every [`EvalContext::get`] call during `evaluate`
/// records an edge from the attribute being computed to the attribute read,
/// replacing the edge set recorded by the previous evaluation. Conditional
/// reads therefore track exactly the inputs the current value depends on.
///
/// Rules own their captured state (`&mut self`), so a rule may keep scratch
/// buffers or child bookkeeping across evaluations.
///
/// # Example
///
/// ```
/// use canopy_graph::{Attribute, EvalContext, Graph, Rule};
///
/// struct Sum(Vec<Attribute<i32>>);
///
/// impl Rule for Sum {
///     type Output = i32;
///     fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> i32 {
///         self.0.iter().map(|&a| ctx.get(a)).sum()
///     }
/// }
/// ```
pub trait Rule: 'static {
    /// The value this rule computes.
    type Output: Clone + 'static;

    /// Computes the current value, reading inputs through `ctx`.
    fn evaluate(&mut self, ctx: &mut EvalContext<'_>) -> Self::Output;
}

/// The read surface available to a [`Rule`] during evaluation.
///
/// Reads through the context are recorded as dependency edges of the
/// attribute currently being evaluated.
pub struct EvalContext<'a> {
    graph: &'a mut Graph,
}

impl core::fmt::Debug for EvalContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EvalContext").finish_non_exhaustive()
    }
}

impl<'a> EvalContext<'a> {
    pub(crate) fn new(graph: &'a mut Graph) -> Self {
        Self { graph }
    }

    /// Reads an attribute, recording a dependency on it.
    ///
    /// Dirty inputs are evaluated first (recursively), so the value seen is
    /// always current.
    pub fn get<T: Clone + 'static>(&mut self, attr: Attribute<T>) -> T {
        self.graph.get(attr)
    }

    /// Reads a weak attribute, recording a dependency if it is still live.
    ///
    /// Returns `None` if the attribute's subgraph has been torn down.
    pub fn get_weak<T: Clone + 'static>(&mut self, weak: WeakAttribute<T>) -> Option<T> {
        self.graph.get_weak(weak)
    }

    /// Returns the version seed of an attribute without recording a
    /// dependency or forcing evaluation.
    #[must_use]
    pub fn seed<T>(&self, attr: Attribute<T>) -> VersionSeed {
        self.graph.seed(attr)
    }

    /// Always `true` inside a rule body; exposed for assertions in code
    /// shared with non-evaluation paths.
    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.graph.is_updating()
    }
}

/// Object-safe wrapper over [`Rule`] so the graph can store heterogeneous
/// rule bodies in one arena.
pub(crate) trait ErasedRule {
    fn evaluate_erased(&mut self, ctx: &mut EvalContext<'_>) -> Box<dyn Any>;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<R: Rule> ErasedRule for R {
    fn evaluate_erased(&mut self, ctx: &mut EvalContext<'_>) -> Box<dyn Any> {
        Box::new(self.evaluate(ctx))
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
