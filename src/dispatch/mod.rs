// This module turns a kernel into something that runs on the array server. `compile` takes
// the process-wide CPU target lock, installs the server's code generator and triple source
// through a TargetOverride, and runs the IR pipeline with the flags remote execution
// requires (nopython, no managed runtime). The override and the lock are released when
// `compile` returns, whatever the outcome. `make_proxy` wraps the resulting unit in a
// RemoteFunction; applying it sends one `run1D` request carrying the symbol name and the IR
// text and maps the reply to an array handle. A proxy never recompiles, so a failed request
// can be retried with the same unit.

//! Compilation for the server and remote invocation.

pub mod for_each;

pub use for_each::for_each;

use crate::codegen::{CpuTarget, TargetOverride};
use crate::core::error::{RemoteDispatchError, Result};
use crate::frontend::{Kernel, NumericType, Signature};
use crate::pipeline::{compile_kernel, CompileConfig, CompiledUnit, PipelineClass};
use crate::remote::{parse_created_reply, Client, PdArray, RequestParams, JIT_COMMAND, RUN_1D};
use std::sync::Arc;

/// Caller-chosen compilation options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// `ret(arg, ...)`, e.g. `"int64(int64)"`.
    pub signature: String,
}

impl DispatchOptions {
    pub fn new(signature: &str) -> Self {
        Self {
            signature: signature.to_string(),
        }
    }
}

/// Flags every server compilation runs with.
pub const REMOTE_CONFIG: CompileConfig = CompileConfig {
    nopython: true,
    nrt: false,
    pipeline: PipelineClass::Ir,
};

/// Compile `kernel` to IR for `client`'s server.
pub fn compile(client: &Client, kernel: &Kernel, options: &DispatchOptions) -> Result<CompiledUnit> {
    let mut target = CpuTarget::lock();
    let scope = TargetOverride::remote(&mut target, client);
    let unit = compile_kernel(&scope, kernel, &options.signature, &REMOTE_CONFIG)?;
    log::info!("compiled {} for the server as {}", kernel.name(), unit.symbol_name);
    Ok(unit)
}

/// Wrap a compiled unit in a callable proxy.
pub fn make_proxy(unit: CompiledUnit) -> RemoteFunction {
    RemoteFunction { unit }
}

/// [`compile`] followed by [`make_proxy`].
pub fn ir_compile(client: &Client, kernel: &Kernel, options: &DispatchOptions) -> Result<RemoteFunction> {
    compile(client, kernel, options).map(make_proxy)
}

/// A kernel compiled for the server, ready to run over its arrays.
#[derive(Debug, Clone)]
pub struct RemoteFunction {
    unit: CompiledUnit,
}

impl RemoteFunction {
    /// Entry point the server looks up in the IR.
    pub fn symbol_name(&self) -> &str {
        &self.unit.symbol_name
    }

    pub fn ir_text(&self) -> &str {
        &self.unit.ir_text
    }

    pub fn signature(&self) -> &Signature {
        &self.unit.signature
    }

    pub fn unit(&self) -> &CompiledUnit {
        &self.unit
    }

    /// Run over every element of `array` on the server.
    ///
    /// In place, the server overwrites `array` and the same handle is
    /// returned. Otherwise the server creates a new array, named in its
    /// reply.
    pub fn apply(&self, client: &Client, array: &Arc<PdArray>, inplace: bool) -> Result<Arc<PdArray>> {
        let symbol = self.symbol_name();
        let params = RequestParams::new()
            .with("request", RUN_1D)
            .with("fname", symbol)
            .with("func_ir", self.ir_text())
            .with("arr_name", array.name())
            .with("inplace", inplace);

        log::info!("running {} over {} (inplace: {})", symbol, array, inplace);
        let reply = client
            .generic_msg(JIT_COMMAND, &params)
            .map_err(|source| RemoteDispatchError::Transport {
                symbol: symbol.to_string(),
                source,
            })?;

        if inplace {
            return Ok(Arc::clone(array));
        }

        let created = parse_created_reply(&reply).ok_or_else(|| RemoteDispatchError::MalformedResponse {
            symbol: symbol.to_string(),
            reply: reply.clone(),
        })?;
        let dtype = created
            .dtype
            .as_deref()
            .and_then(|d| d.parse::<NumericType>().ok())
            .unwrap_or(self.unit.signature.ret);

        log::debug!("{} created {}", symbol, created.name);
        Ok(Arc::new(PdArray::new(created.name, dtype)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Error;
    use crate::test_utils::{ScriptedTransport, StaticToolchain};

    fn unit() -> CompiledUnit {
        CompiledUnit {
            symbol_name: "cfunc.add_one.0".into(),
            ir_text: "; ModuleID = 'cfunc.add_one.0'".into(),
            signature: Signature::unary(NumericType::Int64),
            object_code: None,
        }
    }

    fn client(transport: &Arc<ScriptedTransport>) -> Client {
        Client::with_host(transport.clone(), Arc::new(StaticToolchain::x86_64_client()))
    }

    #[test]
    fn test_apply_sends_run_request() {
        let transport = Arc::new(ScriptedTransport::x86_64_server());
        transport.push_reply(r#"{"created": "arr42"}"#);
        let client = client(&transport);
        let input = Arc::new(PdArray::new("arr7", NumericType::Int64));

        let out = make_proxy(unit()).apply(&client, &input, false).unwrap();
        assert_eq!(out.name(), "arr42");
        assert_eq!(out.dtype(), NumericType::Int64);

        let call = transport.last_request(RUN_1D).unwrap();
        assert_eq!(call.command, JIT_COMMAND);
        assert_eq!(call.params.get_str("fname"), Some("cfunc.add_one.0"));
        assert_eq!(call.params.get_str("arr_name"), Some("arr7"));
        assert_eq!(call.params.get("inplace").and_then(|v| v.as_bool()), Some(false));
    }

    #[test]
    fn test_reply_dtype_wins() {
        let transport = Arc::new(ScriptedTransport::x86_64_server());
        transport.push_reply("created id_3 float64 10 1 (10,) 8");
        let client = client(&transport);
        let input = Arc::new(PdArray::new("arr7", NumericType::Int64));

        let out = make_proxy(unit()).apply(&client, &input, false).unwrap();
        assert_eq!(out.name(), "id_3");
        assert_eq!(out.dtype(), NumericType::Float64);
    }

    #[test]
    fn test_malformed_reply() {
        let transport = Arc::new(ScriptedTransport::x86_64_server());
        transport.push_reply("Error: no such array");
        let client = client(&transport);
        let input = Arc::new(PdArray::new("arr7", NumericType::Int64));

        let result = make_proxy(unit()).apply(&client, &input, false);
        assert!(matches!(
            result,
            Err(Error::RemoteDispatch(RemoteDispatchError::MalformedResponse { .. }))
        ));
    }

    #[test]
    fn test_inplace_ignores_reply_body() {
        let transport = Arc::new(ScriptedTransport::x86_64_server());
        transport.push_reply("ok");
        let client = client(&transport);
        let input = Arc::new(PdArray::new("arr7", NumericType::Int64));

        let out = make_proxy(unit()).apply(&client, &input, true).unwrap();
        assert!(Arc::ptr_eq(&out, &input));
    }

    #[test]
    fn test_remote_config_is_restricted() {
        assert!(REMOTE_CONFIG.nopython);
        assert!(!REMOTE_CONFIG.nrt);
        assert_eq!(REMOTE_CONFIG.pipeline, PipelineClass::Ir);
    }
}
