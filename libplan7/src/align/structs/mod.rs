mod dp_matrix;
pub use dp_matrix::{DpMatrix, MatrixError, MatrixKind, MatrixValidationError};

mod trace;
pub use trace::{Trace, TraceError, TraceStep};
