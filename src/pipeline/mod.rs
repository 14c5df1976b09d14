// This module defines the compilation pipeline: an ordered list of passes run over a shared
// CompileState. A PassManager is built by DefaultPassBuilder, finalized, and only then run;
// a finalized manager rejects new passes so no caller can splice a stage in after the
// pipeline shape has been decided. Two pipeline classes exist. The native class runs the
// front-end, finalizes the library, then optimizes and emits an object for the code
// generator's machine. The IR class stops right after library finalization, so nothing
// machine specific ever runs on the client and the unoptimized, target-tagged IR is the
// output. Every pass reports a PassKind, which is how the truncation is checked.

//! Pass manager, pipeline classes and the compile driver.

pub mod passes;

use crate::codegen::CpuTarget;
use crate::core::error::{CompileError, CompileResult, Result};
use crate::core::session::CompilationSession;
use crate::frontend::parser::ParsedBody;
use crate::frontend::typing::TypeMap;
use crate::frontend::{next_symbol_name, Kernel, Signature};
use bumpalo::Bump;
use inkwell::context::Context;
use inkwell::module::Module;
use std::fmt;

/// Stage a pass belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PassKind {
    /// Signature translation, parsing, typing and library finalization.
    FrontEnd,
    /// Generation and verification of target-tagged IR.
    Lowering,
    /// Optimization tuned for a particular CPU.
    Optimization,
    /// Instruction selection and object emission.
    MachineLowering,
}

impl PassKind {
    /// Whether the pass depends on the CPU that will run the code.
    pub fn is_target_specific(&self) -> bool {
        matches!(self, PassKind::Optimization | PassKind::MachineLowering)
    }
}

/// One step of a compilation pipeline.
pub trait CompilerPass: Send + Sync {
    fn name(&self) -> &'static str;

    fn kind(&self) -> PassKind;

    fn run(&self, state: &mut CompileState<'_, '_, '_>) -> Result<()>;
}

/// Ordered pass list; immutable once finalized.
pub struct PassManager {
    name: &'static str,
    passes: Vec<Box<dyn CompilerPass>>,
    finalized: bool,
}

impl PassManager {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            passes: Vec::new(),
            finalized: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn add_pass(&mut self, pass: impl CompilerPass + 'static) -> CompileResult<()> {
        if self.finalized {
            return Err(CompileError::Pipeline {
                reason: format!(
                    "cannot add pass `{}` to finalized pipeline `{}`",
                    pass.name(),
                    self.name
                ),
            });
        }
        self.passes.push(Box::new(pass));
        Ok(())
    }

    pub fn finalize(&mut self) {
        self.finalized = true;
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// `(name, kind)` of every pass, in run order.
    pub fn stages(&self) -> Vec<(&'static str, PassKind)> {
        self.passes.iter().map(|p| (p.name(), p.kind())).collect()
    }

    pub fn run(&self, state: &mut CompileState<'_, '_, '_>) -> Result<()> {
        if !self.finalized {
            return Err(CompileError::Pipeline {
                reason: format!("pipeline `{}` was not finalized", self.name),
            }
            .into());
        }

        for pass in &self.passes {
            log::debug!("{}: running pass {}", self.name, pass.name());
            pass.run(state)?;
            state.session.record_pass(pass.name());
        }
        Ok(())
    }
}

impl fmt::Debug for PassManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassManager")
            .field("name", &self.name)
            .field("passes", &self.stages())
            .field("finalized", &self.finalized)
            .finish()
    }
}

/// Builds the standard pass lists.
pub struct DefaultPassBuilder;

impl DefaultPassBuilder {
    /// Front-end passes through library finalization.
    pub fn define_nopython_pipeline(name: &'static str) -> CompileResult<PassManager> {
        use passes::*;

        let mut pm = PassManager::new(name);
        pm.add_pass(TranslateSignature)?;
        pm.add_pass(ParseKernel)?;
        pm.add_pass(NopythonTypeInference)?;
        pm.add_pass(StaticExecutionCheck)?;
        pm.add_pass(NativeLowering)?;
        pm.add_pass(VerifyModule)?;
        pm.add_pass(FinalizeLibrary)?;
        Ok(pm)
    }

    /// The nopython pipeline followed by optimization and object emission.
    pub fn define_native_pipeline(name: &'static str) -> CompileResult<PassManager> {
        let mut pm = Self::define_nopython_pipeline(name)?;
        pm.add_pass(passes::OptimizeModule)?;
        pm.add_pass(passes::EmitObject)?;
        Ok(pm)
    }
}

/// Which pipeline a compilation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineClass {
    /// Stop at finalized, unoptimized IR.
    Ir,
    /// Optimize and emit an object for the code generator's machine.
    Native,
}

impl PipelineClass {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineClass::Ir => "ir",
            PipelineClass::Native => "native",
        }
    }

    /// Finalized pipelines to try, in order.
    pub fn define_pipelines(&self) -> CompileResult<Vec<PassManager>> {
        let mut pm = match self {
            PipelineClass::Ir => DefaultPassBuilder::define_nopython_pipeline("ir_nopython")?,
            PipelineClass::Native => DefaultPassBuilder::define_native_pipeline("native_nopython")?,
        };
        pm.finalize();
        Ok(vec![pm])
    }
}

/// Compilation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileConfig {
    /// Require full static typing.
    pub nopython: bool,
    /// Link against the managed runtime.
    pub nrt: bool,
    pub pipeline: PipelineClass,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            nopython: true,
            nrt: false,
            pipeline: PipelineClass::Native,
        }
    }
}

/// Output of one compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledUnit {
    pub symbol_name: String,
    pub ir_text: String,
    pub signature: Signature,
    /// Object code, present only for the native pipeline.
    pub object_code: Option<Vec<u8>>,
}

/// Everything passes read and produce during one compilation.
pub struct CompileState<'s, 'a, 'ctx> {
    pub session: &'s CompilationSession<'a>,
    pub context: &'ctx Context,
    pub target: &'s CpuTarget,
    pub kernel: &'s Kernel,
    pub config: &'s CompileConfig,
    pub signature_text: &'s str,
    pub symbol_name: String,
    pub signature: Option<Signature>,
    pub body: Option<ParsedBody<'a>>,
    pub types: Option<TypeMap>,
    pub module: Option<Module<'ctx>>,
    pub object_code: Option<Vec<u8>>,
}

fn missing(what: &str) -> CompileError {
    CompileError::Pipeline {
        reason: format!("{} is not available yet", what),
    }
}

impl<'s, 'a, 'ctx> CompileState<'s, 'a, 'ctx> {
    pub fn new(
        session: &'s CompilationSession<'a>,
        context: &'ctx Context,
        target: &'s CpuTarget,
        kernel: &'s Kernel,
        signature_text: &'s str,
        config: &'s CompileConfig,
    ) -> Self {
        Self {
            session,
            context,
            target,
            kernel,
            config,
            signature_text,
            symbol_name: next_symbol_name(kernel.name()),
            signature: None,
            body: None,
            types: None,
            module: None,
            object_code: None,
        }
    }

    pub fn signature(&self) -> CompileResult<&Signature> {
        self.signature.as_ref().ok_or_else(|| missing("signature"))
    }

    pub fn body(&self) -> CompileResult<&ParsedBody<'a>> {
        self.body.as_ref().ok_or_else(|| missing("parsed body"))
    }

    pub fn types(&self) -> CompileResult<&TypeMap> {
        self.types.as_ref().ok_or_else(|| missing("type map"))
    }

    pub fn module(&self) -> CompileResult<&Module<'ctx>> {
        self.module.as_ref().ok_or_else(|| missing("module"))
    }

    fn into_unit(self) -> CompileResult<CompiledUnit> {
        let module = self.module.ok_or_else(|| missing("module"))?;
        let signature = self.signature.ok_or_else(|| missing("signature"))?;
        let ir_text = module.print_to_string().to_string();
        self.session.record_kernel_compiled(&self.symbol_name, ir_text.len());

        Ok(CompiledUnit {
            symbol_name: self.symbol_name,
            ir_text,
            signature,
            object_code: self.object_code,
        })
    }
}

/// Compile `kernel` against `target`.
///
/// The caller decides which target that is; remote compilations hold a
/// [`TargetOverride`](crate::codegen::TargetOverride) for the duration.
pub fn compile_kernel(
    target: &CpuTarget,
    kernel: &Kernel,
    signature: &str,
    config: &CompileConfig,
) -> Result<CompiledUnit> {
    log::info!(
        "compiling {} as {} with pipeline {} on {}",
        kernel.name(),
        signature,
        config.pipeline.name(),
        target.codegen().name()
    );

    let arena = Bump::new();
    let session = CompilationSession::new(&arena);
    let context = Context::create();

    let mut last_error = None;
    for pm in config.pipeline.define_pipelines()? {
        let mut state = CompileState::new(&session, &context, target, kernel, signature, config);
        match pm.run(&mut state) {
            Ok(()) => {
                let unit = state.into_unit()?;
                log::debug!("{}", session.stats());
                log::trace!("{}: {} bytes of IR", unit.symbol_name, unit.ir_text.len());
                return Ok(unit);
            }
            Err(err) => {
                log::debug!("pipeline {} failed: {}", pm.name(), err);
                last_error = Some(err);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| missing("pipeline").into()))
}
