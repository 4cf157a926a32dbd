//! Bicameral - two hemispheres, one verdict, one consent gate
//!
//! The binary wires the workspace crates together; this library exposes its
//! command line handling so it can be tested.

pub mod cli;

pub use bicameral_core as core;
pub use bicameral_gateway as gateway;
pub use bicameral_llm as llm;
pub use bicameral_pipeline as pipeline;
