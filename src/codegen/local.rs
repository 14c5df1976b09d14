//! Code generator for the client's own machine.
//!
//! This is the process-wide default. It reads triple, CPU and features from
//! the local toolchain, infers the data layout from an LLVM target machine
//! on first use, and installs finished modules into the [`LocalEngine`].

use super::{stamped_module, Codegen};
use crate::core::error::{CompileError, Result};
use crate::target::HostToolchain;
use inkwell::context::Context;
use inkwell::module::Module;
use inkwell::passes::PassBuilderOptions;
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine, TargetTriple,
};
use inkwell::OptimizationLevel;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock};

/// Registry of modules installed for local execution.
#[derive(Debug, Default)]
pub struct LocalEngine {
    modules: Mutex<Vec<String>>,
    env: Mutex<HashMap<String, String>>,
}

impl LocalEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The engine behind the process-wide default code generator.
    pub fn global() -> Arc<LocalEngine> {
        static GLOBAL: OnceLock<Arc<LocalEngine>> = OnceLock::new();
        Arc::clone(GLOBAL.get_or_init(|| Arc::new(LocalEngine::new())))
    }

    pub fn register(&self, module_name: &str) {
        lock(&self.modules).push(module_name.to_string());
    }

    /// Names of registered modules, in registration order.
    pub fn registered_modules(&self) -> Vec<String> {
        lock(&self.modules).clone()
    }

    pub fn set_env(&self, name: &str, value: &str) {
        lock(&self.env).insert(name.to_string(), value.to_string());
    }

    pub fn env(&self, name: &str) -> Option<String> {
        lock(&self.env).get(name).cloned()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// The default code generator, targeting the local host.
pub struct LocalCodegen {
    name: String,
    host: Arc<dyn HostToolchain>,
    engine: Arc<LocalEngine>,
    layout: RwLock<Option<String>>,
}

impl LocalCodegen {
    pub fn new(name: &str, host: Arc<dyn HostToolchain>, engine: Arc<LocalEngine>) -> Self {
        Self {
            name: name.to_string(),
            host,
            engine,
            layout: RwLock::new(None),
        }
    }

    pub fn engine(&self) -> &Arc<LocalEngine> {
        &self.engine
    }

    fn target_machine(&self) -> Result<TargetMachine> {
        Target::initialize_native(&InitializationConfig::default())
            .map_err(|reason| CompileError::Llvm { reason })?;

        let triple = TargetTriple::create(&self.host.process_triple());
        let target = Target::from_triple(&triple).map_err(|e| CompileError::Llvm {
            reason: e.to_string(),
        })?;

        let machine = target
            .create_target_machine(
                &triple,
                &self.host.cpu_name(),
                &self.host.cpu_features(),
                OptimizationLevel::Default,
                RelocMode::Default,
                CodeModel::JITDefault,
            )
            .ok_or_else(|| CompileError::Llvm {
                reason: format!("no target machine for {}", self.host.process_triple()),
            })?;
        Ok(machine)
    }
}

impl Codegen for LocalCodegen {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_module<'ctx>(&self, context: &'ctx Context, name: &str) -> Result<Module<'ctx>> {
        let layout = self.data_layout()?;
        Ok(stamped_module(context, name, &self.host.process_triple(), &layout))
    }

    fn host_cpu_name(&self) -> Result<String> {
        Ok(self.host.cpu_name())
    }

    fn host_cpu_features(&self) -> Result<String> {
        Ok(self.host.cpu_features())
    }

    fn data_layout(&self) -> Result<String> {
        if let Some(layout) = self.layout.read().unwrap_or_else(|e| e.into_inner()).as_ref() {
            return Ok(layout.clone());
        }

        let machine = self.target_machine()?;
        let inferred = machine
            .get_target_data()
            .get_data_layout()
            .as_str()
            .to_string_lossy()
            .into_owned();
        log::debug!("{}: inferred data layout {}", self.name, inferred);
        self.set_data_layout(&inferred);
        Ok(inferred)
    }

    fn set_data_layout(&self, layout: &str) {
        *self.layout.write().unwrap_or_else(|e| e.into_inner()) = Some(layout.to_string());
    }

    fn register_module(&self, module: &Module<'_>) -> Result<()> {
        let name = module.get_name().to_string_lossy();
        log::debug!("{}: registering module {}", self.name, name);
        self.engine.register(&name);
        Ok(())
    }

    fn set_env(&self, name: &str, value: &str) {
        self.engine.set_env(name, value);
    }

    fn optimize_module(&self, module: &Module<'_>) -> Result<()> {
        let machine = self.target_machine()?;
        module
            .run_passes("default<O2>", &machine, PassBuilderOptions::create())
            .map_err(|e| CompileError::Llvm {
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn emit_object(&self, module: &Module<'_>) -> Result<Vec<u8>> {
        let machine = self.target_machine()?;
        let buffer = machine
            .write_to_memory_buffer(module, FileType::Object)
            .map_err(|e| CompileError::Llvm {
                reason: e.to_string(),
            })?;
        Ok(buffer.as_slice().to_vec())
    }
}
