// This module holds the infrastructure shared by every other part of xtarget: the error
// taxonomy (thiserror based, one enum per failure site plus the caller-facing wrapper), the
// arena-backed compilation session that owns one kernel's AST and records which passes ran,
// and the scripted transport and static toolchain used to drive compilation and dispatch in
// tests without a server or a particular host CPU.

//! Core infrastructure.
//!
//! - [`error`] - error types and result aliases
//! - [`session`] - arena-based compilation session and statistics
//! - [`test_utils`] - scripted transport and fixed toolchain for tests

pub mod error;
pub mod session;
pub mod test_utils;

pub use error::{CompileError, CompileResult, Error, Result};
pub use session::{CompilationSession, SessionStats};
