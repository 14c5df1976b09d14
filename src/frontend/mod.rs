// This module is the kernel front-end: a small numeric expression language standing in for
// the user functions the array server runs elementwise. A Kernel is a name, a parameter
// list and a single-expression body. The body is parsed into an arena-allocated AST, every
// node is typed in nopython mode (no dynamic fallback), and the typed tree is lowered into
// one LLVM function whose ABI follows the requested signature. Pass ordering, target
// selection and module finalization live in the pipeline module; this module only provides
// the individual stages and the kernel and symbol naming types they share.

//! Kernel front-end: parsing, typing and lowering of numeric kernels.
//!
//! - [`types`] - scalar types, promotion and signatures
//! - [`ast`] - the arena expression tree
//! - [`parser`] - body text to AST
//! - [`typing`] - nopython type inference
//! - [`lower`] - AST to an LLVM function

pub mod ast;
pub mod lower;
pub mod parser;
pub mod types;
pub mod typing;

pub use types::{NumericType, Signature};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// A user kernel: `name(params) = body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kernel {
    name: String,
    params: Vec<String>,
    body: String,
}

impl Kernel {
    pub fn new(name: &str, params: &[&str], body: &str) -> Self {
        Self {
            name: name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            body: body.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

impl fmt::Display for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({}) = {}", self.name, self.params.join(", "), self.body)
    }
}

static SYMBOL_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Fresh process-unique symbol `cfunc.<kernel>.<n>` for `kernel_name`.
pub fn next_symbol_name(kernel_name: &str) -> String {
    let n = SYMBOL_COUNTER.fetch_add(1, Ordering::Relaxed);
    let base: String = kernel_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    let base = if base.is_empty() { "anon".to_string() } else { base };
    format!("cfunc.{}.{}", base, n)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_display() {
        let kernel = Kernel::new("axpy", &["a", "x", "y"], "a * x + y");
        assert_eq!(kernel.to_string(), "axpy(a, x, y) = a * x + y");
        assert_eq!(kernel.params().len(), 3);
    }

    #[test]
    fn test_symbol_names_are_unique() {
        let first = next_symbol_name("add_one");
        let second = next_symbol_name("add_one");
        assert!(first.starts_with("cfunc.add_one."));
        assert_ne!(first, second);
        assert!(next_symbol_name("my kernel").starts_with("cfunc.my_kernel."));
        assert!(next_symbol_name("").starts_with("cfunc.anon."));
    }
}
