//! Utilities such as [`DenseNatMap`], which backs the runtime's actor table, and [`VectorClock`],
//! which tracks happens-before between the steps of an execution.

mod densenatmap;
mod vector_clock;

pub use densenatmap::*;
pub use vector_clock::*;
