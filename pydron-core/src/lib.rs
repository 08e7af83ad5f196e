//! Pydron: a distributed dataflow runtime. A front end lowers an imperative
//! program into a [`graph::Graph`] of [`task::Task`]s addressed by
//! [`tick::Tick`]; [`traverser::Traverser`] speculatively refines and
//! evaluates it, dispatching work onto a [`pool::Pool`] of [`worker::Worker`]s
//! through a [`pool::strategy::SchedulingStrategy`].
//!
//! Everything outside this crate — parsing a source program into a graph,
//! launching worker processes, and the wire protocol between them — is a
//! front-end/deployment concern this engine assumes rather than implements.

pub mod config;
pub mod error;
pub mod graph;
pub mod pool;
pub mod ready;
pub mod task;
pub mod tick;
pub mod traverser;
pub mod value;
pub mod worker;

pub use error::{PydronError, Result};
pub use graph::{Endpoint, Graph};
pub use tick::Tick;
pub use value::Value;
