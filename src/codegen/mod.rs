// This module defines the Codegen trait, the seam at which the compiler's target is chosen.
// A code generator creates the empty modules the front-end lowers into (stamping them with
// a triple and data layout), reports the CPU name and features to put on functions, owns
// the data layout, and, for a local target, installs finished modules into the local engine
// and runs the optimization and object emission stages. The process-wide default generator
// lives in the CpuTarget; the cross-target generator replaces it for the duration of one
// remote compilation through the TargetOverride guard.

//! Code generators and the process-wide CPU target.
//!
//! - [`Codegen`] - the code generator interface
//! - [`local`] - the default generator for the client's own machine
//! - [`cross`] - the generator that targets the remote server
//! - [`cpu_target`] - the global target slot and its scoped override

pub mod cpu_target;
pub mod cross;
pub mod local;

pub use cpu_target::{CpuTarget, TargetOverride};
pub use cross::CrossTargetCodegen;
pub use local::{LocalCodegen, LocalEngine};

use crate::core::error::Result;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::targets::{TargetData, TargetTriple};

/// A code generation backend.
///
/// Interior mutability is used where state changes (`set_data_layout`,
/// `set_env`), so generators can be shared behind `Arc` in the global
/// [`CpuTarget`].
pub trait Codegen: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Empty module stamped with this generator's triple and data layout.
    fn create_module<'ctx>(&self, context: &'ctx Context, name: &str) -> Result<Module<'ctx>>;

    /// CPU model put in each function's `target-cpu` attribute.
    fn host_cpu_name(&self) -> Result<String>;

    /// Features put in each function's `target-features` attribute.
    fn host_cpu_features(&self) -> Result<String>;

    fn data_layout(&self) -> Result<String>;

    fn set_data_layout(&self, layout: &str);

    /// Install a finished module into the engine that would execute it.
    fn register_module(&self, module: &Module<'_>) -> Result<()>;

    /// Configure an execution environment value for compiled code.
    fn set_env(&self, name: &str, value: &str);

    /// Run target-specific optimization on `module`.
    fn optimize_module(&self, module: &Module<'_>) -> Result<()>;

    /// Lower `module` to an object file for this generator's machine.
    fn emit_object(&self, module: &Module<'_>) -> Result<Vec<u8>>;
}

/// Module names end up in IR text; keep them plain ASCII.
pub fn normalize_ir_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect()
}

/// Create an empty module with the given triple and data layout.
pub(crate) fn stamped_module<'ctx>(
    context: &'ctx Context,
    name: &str,
    triple: &str,
    layout: &str,
) -> Module<'ctx> {
    let module = context.create_module(&normalize_ir_name(name));
    module.set_triple(&TargetTriple::create(triple));
    if !layout.is_empty() {
        let target_data = TargetData::create(layout);
        module.set_data_layout(&target_data.get_data_layout());
    }
    module
}
