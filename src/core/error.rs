// This module defines the error taxonomy for xtarget using the thiserror crate. Errors are
// split by where they surface: TransportError is what a transport implementation reports
// for a failed round trip, PropertyRetrievalError covers a failed or malformed remote target
// property fetch, CompileError covers everything the kernel front-end and pipeline can
// reject, and RemoteDispatchError covers a failed or malformed execution request. The
// top-level Error wraps the three caller-facing kinds so compile and dispatch entry points
// can use `?` across layers. Nothing here is retried; retry policy belongs to the caller.

//! Error types for cross-target compilation and dispatch.

use thiserror::Error;

/// Failure reported by a [`Transport`](crate::remote::Transport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("transport failure: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// A remote target property could not be retrieved.
#[derive(Error, Debug)]
pub enum PropertyRetrievalError {
    #[error("failed to fetch remote target property `{property}`")]
    Transport {
        property: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("malformed reply for remote target property `{property}`: {reply:?}")]
    Malformed {
        property: &'static str,
        reply: String,
    },
}

/// The front-end or the pipeline rejected a kernel.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("unknown type `{name}`")]
    UnknownType { name: String },

    #[error("invalid signature `{signature}`: {reason}")]
    BadSignature { signature: String, reason: String },

    #[error("unknown name `{name}`")]
    UnknownName { name: String },

    #[error("`{callee}` expects {expected} argument(s), got {found}")]
    Arity {
        callee: String,
        expected: usize,
        found: usize,
    },

    #[error("typing error: {reason}")]
    Typing { reason: String },

    #[error("object mode is not supported; kernels must compile in nopython mode")]
    ObjectMode,

    #[error("managed runtime support is unavailable for pipeline `{pipeline}`")]
    RuntimeUnavailable { pipeline: &'static str },

    #[error("pass `{pass}` is target specific and cannot run for `{codegen}`")]
    TargetSpecificPass {
        pass: &'static str,
        codegen: String,
    },

    #[error("invalid IR produced for `{symbol}`: {reason}")]
    InvalidIr { symbol: String, reason: String },

    #[error("LLVM builder error: {0}")]
    Builder(#[from] inkwell::builder::BuilderError),

    #[error("LLVM error: {reason}")]
    Llvm { reason: String },

    #[error("pipeline error: {reason}")]
    Pipeline { reason: String },
}

/// An execution request failed or its reply could not be understood.
#[derive(Error, Debug)]
pub enum RemoteDispatchError {
    #[error("remote execution of `{symbol}` failed")]
    Transport {
        symbol: String,
        #[source]
        source: TransportError,
    },

    #[error("malformed reply to remote execution of `{symbol}`: {reply:?}")]
    MalformedResponse { symbol: String, reply: String },
}

/// Caller-facing error for compile and dispatch operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    PropertyRetrieval(#[from] PropertyRetrievalError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    RemoteDispatch(#[from] RemoteDispatchError),
}

/// Result type alias for compile and dispatch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for front-end operations.
pub type CompileResult<T> = std::result::Result<T, CompileError>;

impl From<inkwell::builder::BuilderError> for Error {
    fn from(err: inkwell::builder::BuilderError) -> Self {
        Error::Compile(CompileError::Builder(err))
    }
}
