//! Lumen - metrics and tracing for service runtimes
//!
//! Facade over [`lumen_core`]; see its documentation for the registry and
//! tracer APIs.

pub use lumen_core::*;
