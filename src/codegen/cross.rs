// This module implements the cross-target code generator. It reports the remote server's
// triple, data layout, CPU name and negotiated features instead of the client's, so the IR
// the front-end produces is already tagged for the machine that will run it. Everything that
// would make the generated code live on the client is suppressed: modules are never
// registered with the local engine, environment values are dropped, and the optimization
// and object emission stages refuse to run because they must happen on the server with its
// real CPU. Writes to the data layout are accepted and ignored so no local layout inference
// can replace the server's value.

//! Code generator emitting IR for the remote server.

use super::{stamped_module, Codegen};
use crate::core::error::{CompileError, Result};
use crate::target::{HostToolchain, RemoteTarget};
use inkwell::context::Context;
use inkwell::module::Module;
use std::sync::Arc;

/// Code generator for the remote server's CPU.
pub struct CrossTargetCodegen {
    name: String,
    remote: Arc<RemoteTarget>,
    local: Arc<dyn HostToolchain>,
}

impl CrossTargetCodegen {
    /// `local` is consulted only to negotiate CPU features.
    pub fn new(name: &str, remote: Arc<RemoteTarget>, local: Arc<dyn HostToolchain>) -> Self {
        Self {
            name: name.to_string(),
            remote,
            local,
        }
    }

    pub fn remote(&self) -> &Arc<RemoteTarget> {
        &self.remote
    }

    fn refuse(&self, pass: &'static str) -> CompileError {
        CompileError::TargetSpecificPass {
            pass,
            codegen: self.name.clone(),
        }
    }
}

impl Codegen for CrossTargetCodegen {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_module<'ctx>(&self, context: &'ctx Context, name: &str) -> Result<Module<'ctx>> {
        let triple = self.remote.triple()?;
        let layout = self.remote.layout()?;
        Ok(stamped_module(context, name, triple, layout))
    }

    fn host_cpu_name(&self) -> Result<String> {
        Ok(self.remote.host()?.to_string())
    }

    fn host_cpu_features(&self) -> Result<String> {
        Ok(self.remote.negotiated_features(self.local.as_ref())?.to_string())
    }

    fn data_layout(&self) -> Result<String> {
        Ok(self.remote.layout()?.to_string())
    }

    fn set_data_layout(&self, layout: &str) {
        log::trace!("{}: ignoring data layout {}", self.name, layout);
    }

    fn register_module(&self, module: &Module<'_>) -> Result<()> {
        log::debug!(
            "{}: not registering {} locally",
            self.name,
            module.get_name().to_string_lossy()
        );
        Ok(())
    }

    fn set_env(&self, _name: &str, _value: &str) {}

    fn optimize_module(&self, _module: &Module<'_>) -> Result<()> {
        Err(self.refuse("optimize_module").into())
    }

    fn emit_object(&self, _module: &Module<'_>) -> Result<Vec<u8>> {
        Err(self.refuse("emit_object").into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::LocalEngine;
    use crate::core::error::Error;
    use crate::test_utils::{ScriptedTransport, StaticToolchain};

    const LAYOUT: &str = "e-m:e-i64:64-f80:128-n8:16:32:64-S128";

    fn codegen(transport: Arc<ScriptedTransport>) -> CrossTargetCodegen {
        let remote = Arc::new(RemoteTarget::new(transport));
        CrossTargetCodegen::new(
            "xtarget.server",
            remote,
            Arc::new(StaticToolchain::x86_64_client()),
        )
    }

    fn server() -> Arc<ScriptedTransport> {
        Arc::new(
            ScriptedTransport::new()
                .with_property("host", "znver4")
                .with_property("triple", "x86_64-pc-linux-gnu")
                .with_property("layout", LAYOUT)
                .with_property("cpu_features", "+avx512f,+avx2,+sse2,+avx"),
        )
    }

    #[test]
    fn test_modules_carry_remote_triple_and_layout() {
        let cg = codegen(server());
        let context = Context::create();
        let module = cg.create_module(&context, "scratch").unwrap();

        assert_eq!(module.get_triple().as_str().to_str().unwrap(), "x86_64-pc-linux-gnu");
        assert_eq!(module.get_data_layout().as_str().to_str().unwrap(), LAYOUT);
    }

    #[test]
    fn test_reports_remote_cpu() {
        let cg = codegen(server());
        assert_eq!(cg.host_cpu_name().unwrap(), "znver4");
        // The client toolchain knows sse2, avx and avx2 but not avx512f.
        assert_eq!(cg.host_cpu_features().unwrap(), "+avx2,+sse2,+avx");
    }

    #[test]
    fn test_layout_writes_are_ignored() {
        let cg = codegen(server());
        cg.set_data_layout("E-m:e-p:32:32");
        assert_eq!(cg.data_layout().unwrap(), LAYOUT);
    }

    #[test]
    fn test_no_local_registration() {
        let engine = LocalEngine::global();
        let before = engine.registered_modules();

        let cg = codegen(server());
        let context = Context::create();
        let module = cg.create_module(&context, "never_local").unwrap();
        cg.register_module(&module).unwrap();
        cg.set_env("cfunc.never_local.env", "x");

        assert_eq!(engine.registered_modules(), before);
        assert_eq!(engine.env("cfunc.never_local.env"), None);
    }

    #[test]
    fn test_target_specific_stages_refused() {
        let cg = codegen(server());
        let context = Context::create();
        let module = cg.create_module(&context, "scratch").unwrap();

        assert!(matches!(
            cg.optimize_module(&module),
            Err(Error::Compile(CompileError::TargetSpecificPass { pass: "optimize_module", .. }))
        ));
        assert!(matches!(
            cg.emit_object(&module),
            Err(Error::Compile(CompileError::TargetSpecificPass { pass: "emit_object", .. }))
        ));
    }

    #[test]
    fn test_retrieval_failure_propagates() {
        let cg = codegen(Arc::new(ScriptedTransport::new()));
        let context = Context::create();
        assert!(matches!(
            cg.create_module(&context, "scratch"),
            Err(Error::PropertyRetrieval(_))
        ));
    }
}
