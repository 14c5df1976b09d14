//! Client-side handle to an array living on the server.

use crate::frontend::NumericType;
use std::fmt;

/// Handle to a server-side one-dimensional array.
///
/// The client only ever reads the element type (to build kernel signatures)
/// and passes the name through to requests. Handles are shared as
/// `Arc<PdArray>`; an in-place operation hands back the same `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdArray {
    name: String,
    dtype: NumericType,
}

impl PdArray {
    pub fn new(name: impl Into<String>, dtype: NumericType) -> Self {
        Self {
            name: name.into(),
            dtype,
        }
    }

    /// Server-side identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dtype(&self) -> NumericType {
        self.dtype
    }
}

impl fmt::Display for PdArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.dtype)
    }
}
