//! The individual compiler passes.
//!
//! Front-end passes only read the [`CpuTarget`](crate::codegen::CpuTarget)
//! through its code generator and triple source, so the same passes produce
//! local or server IR depending on which target is installed.

use super::{CompileState, CompilerPass, PassKind};
use crate::core::error::{CompileError, Result};
use crate::frontend::lower::{lower_function, FunctionDecl};
use crate::frontend::parser::parse_body;
use crate::frontend::typing::infer;
use crate::frontend::Signature;
use crate::target::host::pointer_width;
use std::sync::Arc;

/// Resolve the signature text; `intp` follows the ambient triple.
pub struct TranslateSignature;

impl CompilerPass for TranslateSignature {
    fn name(&self) -> &'static str {
        "translate_signature"
    }

    fn kind(&self) -> PassKind {
        PassKind::FrontEnd
    }

    fn run(&self, state: &mut CompileState<'_, '_, '_>) -> Result<()> {
        let triple = state.target.process_triple()?;
        let signature = Signature::parse(state.signature_text, pointer_width(&triple))?;

        let params = state.kernel.params();
        if signature.args.len() != params.len() {
            return Err(CompileError::BadSignature {
                signature: state.signature_text.to_string(),
                reason: format!(
                    "`{}` takes {} parameter(s) but the signature lists {}",
                    state.kernel.name(),
                    params.len(),
                    signature.args.len()
                ),
            }
            .into());
        }

        log::debug!("{}: signature {} for {}", state.symbol_name, signature, triple);
        state.signature = Some(signature);
        Ok(())
    }
}

pub struct ParseKernel;

impl CompilerPass for ParseKernel {
    fn name(&self) -> &'static str {
        "parse_kernel"
    }

    fn kind(&self) -> PassKind {
        PassKind::FrontEnd
    }

    fn run(&self, state: &mut CompileState<'_, '_, '_>) -> Result<()> {
        state.body = Some(parse_body(state.session, state.kernel.body())?);
        Ok(())
    }
}

pub struct NopythonTypeInference;

impl CompilerPass for NopythonTypeInference {
    fn name(&self) -> &'static str {
        "nopython_type_inference"
    }

    fn kind(&self) -> PassKind {
        PassKind::FrontEnd
    }

    fn run(&self, state: &mut CompileState<'_, '_, '_>) -> Result<()> {
        let signature = state.signature()?;
        let body = state.body()?;
        let params: Vec<_> = state
            .kernel
            .params()
            .iter()
            .map(String::as_str)
            .zip(signature.args.iter().copied())
            .collect();

        let types = infer(state.session, body.root, body.expr_count, &params)?;
        state.types = Some(types);
        Ok(())
    }
}

/// Reject configurations this crate cannot execute: object mode, and the
/// managed runtime in the IR pipeline where no runtime is linked.
pub struct StaticExecutionCheck;

impl CompilerPass for StaticExecutionCheck {
    fn name(&self) -> &'static str {
        "static_execution_check"
    }

    fn kind(&self) -> PassKind {
        PassKind::FrontEnd
    }

    fn run(&self, state: &mut CompileState<'_, '_, '_>) -> Result<()> {
        if !state.config.nopython {
            return Err(CompileError::ObjectMode.into());
        }
        if state.config.nrt && state.config.pipeline == super::PipelineClass::Ir {
            return Err(CompileError::RuntimeUnavailable {
                pipeline: state.config.pipeline.name(),
            }
            .into());
        }
        Ok(())
    }
}

/// Emit the kernel into a module created by the active code generator.
pub struct NativeLowering;

impl CompilerPass for NativeLowering {
    fn name(&self) -> &'static str {
        "native_lowering"
    }

    fn kind(&self) -> PassKind {
        PassKind::Lowering
    }

    fn run(&self, state: &mut CompileState<'_, '_, '_>) -> Result<()> {
        let codegen = Arc::clone(state.target.codegen());
        let module = codegen.create_module(state.context, &state.symbol_name)?;

        let layout = codegen.data_layout()?;
        codegen.set_data_layout(&layout);
        let target_cpu = codegen.host_cpu_name()?;
        let target_features = codegen.host_cpu_features()?;

        let body = state.body()?;
        let decl = FunctionDecl {
            symbol: &state.symbol_name,
            params: state.kernel.params(),
            signature: state.signature()?,
            target_cpu: &target_cpu,
            target_features: &target_features,
        };
        lower_function(state.context, &module, &decl, body.root, state.types()?)?;

        log::debug!(
            "{}: lowered with {} for cpu {:?}",
            state.symbol_name,
            codegen.name(),
            target_cpu
        );
        state.module = Some(module);
        Ok(())
    }
}

pub struct VerifyModule;

impl CompilerPass for VerifyModule {
    fn name(&self) -> &'static str {
        "verify_module"
    }

    fn kind(&self) -> PassKind {
        PassKind::Lowering
    }

    fn run(&self, state: &mut CompileState<'_, '_, '_>) -> Result<()> {
        state.module()?.verify().map_err(|e| CompileError::InvalidIr {
            symbol: state.symbol_name.clone(),
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

/// Hand the finished module to the code generator's engine.
pub struct FinalizeLibrary;

impl CompilerPass for FinalizeLibrary {
    fn name(&self) -> &'static str {
        "finalize_library"
    }

    fn kind(&self) -> PassKind {
        PassKind::FrontEnd
    }

    fn run(&self, state: &mut CompileState<'_, '_, '_>) -> Result<()> {
        let codegen = state.target.codegen();
        codegen.register_module(state.module()?)?;
        codegen.set_env(
            &format!("{}.env", state.symbol_name),
            &state.signature()?.to_string(),
        );
        Ok(())
    }
}

pub struct OptimizeModule;

impl CompilerPass for OptimizeModule {
    fn name(&self) -> &'static str {
        "optimize_module"
    }

    fn kind(&self) -> PassKind {
        PassKind::Optimization
    }

    fn run(&self, state: &mut CompileState<'_, '_, '_>) -> Result<()> {
        state.target.codegen().optimize_module(state.module()?)
    }
}

pub struct EmitObject;

impl CompilerPass for EmitObject {
    fn name(&self) -> &'static str {
        "emit_object"
    }

    fn kind(&self) -> PassKind {
        PassKind::MachineLowering
    }

    fn run(&self, state: &mut CompileState<'_, '_, '_>) -> Result<()> {
        let object = state.target.codegen().emit_object(state.module()?)?;
        log::trace!("{}: {} byte object", state.symbol_name, object.len());
        state.object_code = Some(object);
        Ok(())
    }
}
