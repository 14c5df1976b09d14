//! Elementwise application of a kernel to a whole server array.

use super::{ir_compile, DispatchOptions};
use crate::core::error::Result;
use crate::frontend::Kernel;
use crate::remote::{Client, PdArray};
use std::sync::Arc;

/// Apply `functor` to every element of `array`.
///
/// The kernel is compiled as `dtype(dtype)` for the array's element type
/// and sent in a single request covering the whole array. Returns a new
/// handle, or `array` itself when `inplace`.
pub fn for_each(client: &Client, array: &Arc<PdArray>, functor: &Kernel, inplace: bool) -> Result<Arc<PdArray>> {
    let options = DispatchOptions::new(&format!("{0}({0})", array.dtype()));
    let function = ir_compile(client, functor, &options)?;
    function.apply(client, array, inplace)
}
