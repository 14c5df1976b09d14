//! xtarget - cross-target kernel compilation for a remote array server.
//!
//! Numeric kernels are compiled on the client into unoptimized LLVM IR that
//! is tagged for the *server's* CPU (triple, data layout, CPU name and
//! negotiated features), then shipped to the server, which optimizes, JITs
//! and runs it over arrays that never leave the server.
//!
//! # Primary Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use xtarget::dispatch::{for_each, ir_compile, DispatchOptions};
//! use xtarget::frontend::{Kernel, NumericType};
//! use xtarget::remote::{Client, PdArray};
//!
//! let client = Client::new(transport);
//! let add_one = Kernel::new("add_one", &["x"], "x + 1");
//!
//! // Compile once, run many times.
//! let function = ir_compile(&client, &add_one, &DispatchOptions::new("int64(int64)"))?;
//! let input = Arc::new(PdArray::new("arr7", NumericType::Int64));
//! let output = function.apply(&client, &input, false)?;
//!
//! // Or in one step, typed after the array.
//! let same = for_each(&client, &input, &add_one, true)?;
//! ```
//!
//! # Architecture
//!
//! - [`target`] - remote target descriptor cache, feature negotiation, host facts
//! - [`codegen`] - local and cross-target code generators, the global CPU target
//! - [`frontend`] - kernel parsing, typing and lowering
//! - [`pipeline`] - pass manager and the IR/native pipeline classes
//! - [`dispatch`] - compile for the server and invoke remotely
//! - [`remote`] - transport, request parameters, array handles, client
//! - [`core`] - errors, compilation session, test utilities

pub mod codegen;
pub mod core;
pub mod dispatch;
pub mod frontend;
pub mod pipeline;
pub mod remote;
pub mod target;

pub use crate::core::test_utils;

pub use crate::core::error::{
    CompileError, Error, PropertyRetrievalError, RemoteDispatchError, Result, TransportError,
};
pub use crate::core::session::{CompilationSession, SessionStats};
pub use codegen::{Codegen, CpuTarget, CrossTargetCodegen, LocalCodegen, TargetOverride};
pub use dispatch::{compile, for_each, ir_compile, make_proxy, DispatchOptions, RemoteFunction};
pub use frontend::{Kernel, NumericType, Signature};
pub use pipeline::{CompileConfig, CompiledUnit, PipelineClass};
pub use remote::{Client, OfflineTransport, PdArray, Transport};
pub use target::{RemoteTarget, TargetProperty};
