//! Subcommand implementations.
//!
//! Each command takes one inventory snapshot from the [`Backend`], decides
//! what to do with pure functions over it, then dispatches external tools
//! through a [`Runner`](crate::external::Runner).
//!
//! [`Backend`]: crate::backend::Backend

pub mod create;
pub mod delete;
pub mod list;
