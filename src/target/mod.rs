//! Facts about the machines involved in a cross-target compilation.
//!
//! - [`descriptor`] - write-once cache of the remote server's codegen parameters
//! - [`features`] - CPU feature negotiation between server and client toolchains
//! - [`host`] - the client's own toolchain and the process-triple strategy

pub mod descriptor;
pub mod features;
pub mod host;

pub use descriptor::{RemoteTarget, TargetProperty};
pub use features::negotiate;
pub use host::{HostToolchain, LocalTriple, NativeToolchain, RemoteTriple, TripleSource};
