// src/dag/mod.rs

//! Dependency graph of targets and its concurrent traversal.
//!
//! - [`graph`] holds the [`Dag`] itself: targets keyed by name, with edges
//!   from each target to its prerequisites.
//! - [`walker`] implements `walk_up` / `walk_down`, which visit every node
//!   with bounded concurrency in dependency order.

pub mod graph;
pub mod walker;

pub use graph::Dag;
pub use walker::default_concurrency;
