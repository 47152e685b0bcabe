//! The tree rewriter.
//!
//! [`rewrite`] consumes a [`Tree`] and returns a new one of exactly the same
//! shape: sequences keep their length and order, maps and objects keep their
//! keys in order, and every non-string scalar passes through untouched. Only
//! string leaves can change, and only when the [`LeafRewriter`] returns a
//! replacement.
//!
//! Walking is depth-first in document order, so leaves reach the rewriter in
//! the order they appear in the field; with a materializing rewriter every
//! asset is resolved before the walk moves on to the next leaf.

use crate::tree::{Key, Tree};
use indexmap::IndexMap;

/// Decides the fate of each string leaf.
pub trait LeafRewriter {
    /// Replacement for `value`, or `None` to keep it.
    fn rewrite_leaf(&mut self, value: &str) -> Option<String>;
}

impl<F> LeafRewriter for F
where
    F: FnMut(&str) -> Option<String>,
{
    fn rewrite_leaf(&mut self, value: &str) -> Option<String> {
        self(value)
    }
}

/// Rewrite every string leaf of `node`.
pub fn rewrite<R: LeafRewriter + ?Sized>(node: Tree, leaf: &mut R) -> Tree {
    match node {
        Tree::Str(s) => match leaf.rewrite_leaf(&s) {
            Some(replacement) => Tree::Str(replacement),
            None => Tree::Str(s),
        },
        Tree::Seq(items) => Tree::Seq(
            items
                .into_iter()
                .map(|n| rewrite(n, &mut *leaf))
                .collect(),
        ),
        Tree::Map(fields) => Tree::Map(rewrite_fields(fields, leaf)),
        Tree::Object { class, fields } => Tree::Object {
            class,
            fields: rewrite_fields(fields, leaf),
        },
        scalar @ (Tree::Null | Tree::Bool(_) | Tree::Int(_) | Tree::UInt(_) | Tree::Float(_)) => {
            scalar
        }
    }
}

fn rewrite_fields<R: LeafRewriter + ?Sized>(
    fields: IndexMap<Key, Tree>,
    leaf: &mut R,
) -> IndexMap<Key, Tree> {
    fields
        .into_iter()
        .map(|(k, v)| (k, rewrite(v, &mut *leaf)))
        .collect()
}
