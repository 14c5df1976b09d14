// This module owns the process-wide CPU target: the default code generator and the
// process-triple source every compilation consults. The target sits behind one Mutex, and
// holding the lock is what serializes compilations. TargetOverride swaps in a different
// generator and triple source for one compilation and puts the recorded originals back in
// Drop, so restoration also runs on early exit and during panic unwinding. The guard
// borrows the target mutably, which rules out nesting two overrides on the same target at
// compile time.

//! Process-wide CPU target and its scoped override.

use super::{Codegen, CrossTargetCodegen, LocalCodegen, LocalEngine};
use crate::core::error::Result;
use crate::remote::Client;
use crate::target::{HostToolchain, LocalTriple, NativeToolchain, RemoteTriple, TripleSource};
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

/// The code generator and process-triple source compilations run against.
#[derive(Clone)]
pub struct CpuTarget {
    codegen: Arc<dyn Codegen>,
    triple_source: Arc<dyn TripleSource>,
}

impl CpuTarget {
    pub fn new(codegen: Arc<dyn Codegen>, triple_source: Arc<dyn TripleSource>) -> Self {
        Self {
            codegen,
            triple_source,
        }
    }

    /// Target for the client's own machine.
    pub fn native() -> Self {
        let host: Arc<dyn HostToolchain> = Arc::new(NativeToolchain);
        Self::new(
            Arc::new(LocalCodegen::new("xtarget.local", Arc::clone(&host), LocalEngine::global())),
            Arc::new(LocalTriple(host)),
        )
    }

    /// Lock the process-wide target.
    ///
    /// Hold the guard for the whole of one compilation. A poisoned lock is
    /// recovered: any override active during the panic was already undone
    /// by its guard.
    pub fn lock() -> MutexGuard<'static, CpuTarget> {
        static GLOBAL: OnceLock<Mutex<CpuTarget>> = OnceLock::new();
        GLOBAL
            .get_or_init(|| Mutex::new(CpuTarget::native()))
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    pub fn codegen(&self) -> &Arc<dyn Codegen> {
        &self.codegen
    }

    pub fn triple_source(&self) -> &Arc<dyn TripleSource> {
        &self.triple_source
    }

    /// Triple this target compiles for, per its triple source.
    pub fn process_triple(&self) -> Result<String> {
        self.triple_source.process_triple()
    }

    /// Whether both slots hold exactly the same objects as `other`.
    pub fn same_as(&self, other: &CpuTarget) -> bool {
        Arc::ptr_eq(&self.codegen, &other.codegen)
            && Arc::ptr_eq(&self.triple_source, &other.triple_source)
    }
}

/// Replaces a [`CpuTarget`]'s generator and triple source until dropped.
pub struct TargetOverride<'t> {
    target: &'t mut CpuTarget,
    saved: Option<CpuTarget>,
}

impl<'t> TargetOverride<'t> {
    /// Install `codegen` and `triple_source`, remembering what was there.
    pub fn enter(
        target: &'t mut CpuTarget,
        codegen: Arc<dyn Codegen>,
        triple_source: Arc<dyn TripleSource>,
    ) -> Self {
        let saved = std::mem::replace(target, CpuTarget::new(codegen, triple_source));
        log::debug!(
            "target override: {} -> {}",
            saved.codegen.name(),
            target.codegen.name()
        );
        Self {
            target,
            saved: Some(saved),
        }
    }

    /// Override targeting `client`'s server.
    pub fn remote(target: &'t mut CpuTarget, client: &Client) -> Self {
        let remote = Arc::clone(client.remote_target());
        let codegen = CrossTargetCodegen::new("xtarget.server", Arc::clone(&remote), Arc::clone(client.host()));
        Self::enter(target, Arc::new(codegen), Arc::new(RemoteTriple(remote)))
    }

    /// The target as overridden.
    pub fn target(&self) -> &CpuTarget {
        self.target
    }
}

impl Deref for TargetOverride<'_> {
    type Target = CpuTarget;

    fn deref(&self) -> &CpuTarget {
        self.target
    }
}

impl Drop for TargetOverride<'_> {
    fn drop(&mut self) {
        if let Some(saved) = self.saved.take() {
            log::debug!("target override: restoring {}", saved.codegen.name());
            *self.target = saved;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::{CompileError, Error};
    use crate::test_utils::{ScriptedTransport, StaticToolchain};
    use std::panic::{catch_unwind, AssertUnwindSafe};

    fn local_target() -> CpuTarget {
        let host: Arc<dyn HostToolchain> = Arc::new(StaticToolchain::x86_64_client());
        CpuTarget::new(
            Arc::new(LocalCodegen::new("test.local", Arc::clone(&host), Arc::new(LocalEngine::new()))),
            Arc::new(LocalTriple(host)),
        )
    }

    fn client() -> Client {
        Client::with_host(
            Arc::new(
                ScriptedTransport::new()
                    .with_property("host", "neoverse-v1")
                    .with_property("triple", "aarch64-unknown-linux-gnu")
                    .with_property("layout", "e-m:e-i8:8:32-i16:16:32-i64:64-i128:128-n32:64-S128")
                    .with_property("cpu_features", "+neon"),
            ),
            Arc::new(StaticToolchain::x86_64_client()),
        )
    }

    #[test]
    fn test_override_installs_remote_target() {
        let mut target = local_target();
        let client = client();

        let scope = TargetOverride::remote(&mut target, &client);
        assert_eq!(scope.codegen().name(), "xtarget.server");
        assert_eq!(scope.process_triple().unwrap(), "aarch64-unknown-linux-gnu");
    }

    #[test]
    fn test_restored_after_normal_exit() {
        let mut target = local_target();
        let original = target.clone();
        let client = client();

        {
            let scope = TargetOverride::remote(&mut target, &client);
            assert!(!scope.same_as(&original));
        }

        assert!(target.same_as(&original));
        assert_eq!(target.process_triple().unwrap(), "x86_64-unknown-linux-gnu");
    }

    #[test]
    fn test_restored_after_error() {
        fn compile_under_override(target: &mut CpuTarget, client: &Client) -> Result<()> {
            let _scope = TargetOverride::remote(target, client);
            let typed: std::result::Result<(), CompileError> = Err(CompileError::Typing {
                reason: "rejected".into(),
            });
            typed?;
            Ok(())
        }

        let mut target = local_target();
        let original = target.clone();

        let result = compile_under_override(&mut target, &client());
        assert!(matches!(result, Err(Error::Compile(CompileError::Typing { .. }))));
        assert!(target.same_as(&original));
    }

    #[test]
    fn test_restored_after_panic() {
        let mut target = local_target();
        let original = target.clone();
        let client = client();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _scope = TargetOverride::remote(&mut target, &client);
            panic!("front-end crashed");
        }));

        assert!(outcome.is_err());
        assert!(target.same_as(&original));
    }

    #[test]
    fn test_global_target_defaults_to_local() {
        let target = CpuTarget::lock();
        assert_eq!(target.codegen().name(), "xtarget.local");
    }
}
