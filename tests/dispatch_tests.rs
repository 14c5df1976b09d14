//! End-to-end compile and dispatch against a scripted server.
//!
//! These tests drive `ir_compile`, `RemoteFunction::apply` and `for_each`
//! through `ScriptedTransport` and check the requests the server receives.

use std::sync::Arc;
use xtarget::core::error::{CompileError, Error, PropertyRetrievalError, RemoteDispatchError};
use xtarget::dispatch::{compile, for_each, ir_compile, make_proxy, DispatchOptions};
use xtarget::frontend::{Kernel, NumericType};
use xtarget::remote::{Client, PdArray, JIT_COMMAND, RUN_1D};
use xtarget::test_utils::{ScriptedTransport, StaticToolchain};
use xtarget::CpuTarget;

fn connect(transport: &Arc<ScriptedTransport>) -> Client {
    Client::with_host(transport.clone(), Arc::new(StaticToolchain::x86_64_client()))
}

fn add_one() -> Kernel {
    Kernel::new("add_one", &["x"], "x + 1")
}

#[test]
fn test_round_trip_creates_new_array() {
    let transport = Arc::new(ScriptedTransport::x86_64_server());
    transport.push_reply(r#"{"created": "arr42"}"#);
    let client = connect(&transport);

    let function = ir_compile(&client, &add_one(), &DispatchOptions::new("int64(int64)")).unwrap();
    let input = Arc::new(PdArray::new("arr7", NumericType::Int64));
    let output = function.apply(&client, &input, false).unwrap();

    assert_eq!(output.name(), "arr42");
    assert_eq!(output.dtype(), NumericType::Int64);
    assert!(!Arc::ptr_eq(&output, &input));

    let run = transport.last_request(RUN_1D).unwrap();
    assert_eq!(run.command, JIT_COMMAND);
    assert_eq!(run.params.get_str("fname"), Some(function.symbol_name()));
    assert_eq!(run.params.get_str("arr_name"), Some("arr7"));
    assert_eq!(run.params.get("inplace").and_then(|v| v.as_bool()), Some(false));

    let ir = run.params.get_str("func_ir").unwrap();
    assert!(ir.contains("target triple = \"x86_64-pc-linux-gnu\""));
    assert!(ir.contains(&format!("define i64 @{}(i64 %x)", function.symbol_name())));
    assert!(ir.contains("add i64 %x, 1"));

    let wire: serde_json::Value = serde_json::from_str(&run.params.to_json()).unwrap();
    assert_eq!(wire["request"], "run1D");
    assert_eq!(wire["inplace"], false);
    assert_eq!(wire["func_ir"].as_str(), Some(ir));
}

#[test]
fn test_inplace_returns_same_handle() {
    let transport = Arc::new(ScriptedTransport::x86_64_server());
    transport.push_reply("success");
    let client = connect(&transport);

    let function = ir_compile(&client, &add_one(), &DispatchOptions::new("int64(int64)")).unwrap();
    let input = Arc::new(PdArray::new("arr7", NumericType::Int64));
    let output = function.apply(&client, &input, true).unwrap();

    assert!(Arc::ptr_eq(&output, &input));
    let run = transport.last_request(RUN_1D).unwrap();
    assert_eq!(run.params.get("inplace").and_then(|v| v.as_bool()), Some(true));
}

#[test]
fn test_target_properties_fetched_once_per_client() {
    let transport = Arc::new(ScriptedTransport::x86_64_server());
    let client = connect(&transport);
    let options = DispatchOptions::new("int64(int64)");

    let first = compile(&client, &add_one(), &options).unwrap();
    let second = compile(&client, &add_one(), &options).unwrap();
    assert_ne!(first.symbol_name, second.symbol_name);

    for property in ["host", "triple", "layout", "cpu_features"] {
        assert_eq!(transport.requests_for(property), 1, "{} fetched more than once", property);
    }
}

#[test]
fn test_compile_error_sends_nothing() {
    let transport = Arc::new(ScriptedTransport::x86_64_server());
    let client = connect(&transport);

    let broken = Kernel::new("broken", &["x"], "x +");
    let result = ir_compile(&client, &broken, &DispatchOptions::new("int64(int64)"));

    assert!(matches!(result, Err(Error::Compile(CompileError::Parse { .. }))));
    assert_eq!(transport.requests_for(RUN_1D), 0);
    assert_eq!(CpuTarget::lock().codegen().name(), "xtarget.local");
}

#[test]
fn test_unreachable_server_fails_compile() {
    let transport = Arc::new(ScriptedTransport::new());
    let client = connect(&transport);

    let result = compile(&client, &add_one(), &DispatchOptions::new("int64(int64)"));
    assert!(matches!(
        result,
        Err(Error::PropertyRetrieval(PropertyRetrievalError::Transport { .. }))
    ));
    assert_eq!(CpuTarget::lock().codegen().name(), "xtarget.local");
}

#[test]
fn test_failed_dispatch_can_be_retried() {
    let transport = Arc::new(ScriptedTransport::x86_64_server());
    transport.push_failure("connection reset");
    transport.push_reply(r#"{"created": "arr43"}"#);
    let client = connect(&transport);

    let unit = compile(&client, &add_one(), &DispatchOptions::new("int64(int64)")).unwrap();
    let function = make_proxy(unit);
    let input = Arc::new(PdArray::new("arr7", NumericType::Int64));

    let first = function.apply(&client, &input, false);
    assert!(matches!(
        first,
        Err(Error::RemoteDispatch(RemoteDispatchError::Transport { .. }))
    ));

    let second = function.apply(&client, &input, false).unwrap();
    assert_eq!(second.name(), "arr43");

    // Both attempts shipped the same IR; nothing was recompiled.
    let runs: Vec<_> = transport
        .calls()
        .into_iter()
        .filter(|c| c.request() == Some(RUN_1D))
        .collect();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].params, runs[1].params);
}

#[test]
fn test_for_each_types_kernel_after_array() {
    let transport = Arc::new(ScriptedTransport::x86_64_server());
    transport.push_reply("created id_9 float64 100 1 (100,) 8");
    let client = connect(&transport);

    let root = Kernel::new("root", &["x"], "sqrt(x)");
    let input = Arc::new(PdArray::new("id_1", NumericType::Float64));
    let output = for_each(&client, &input, &root, false).unwrap();

    assert_eq!(output.name(), "id_9");
    assert_eq!(output.dtype(), NumericType::Float64);

    let run = transport.last_request(RUN_1D).unwrap();
    let ir = run.params.get_str("func_ir").unwrap();
    assert!(ir.contains("(double %x)"));
    assert!(ir.contains("@llvm.sqrt.f64"));
}

#[test]
fn test_for_each_inplace() {
    let transport = Arc::new(ScriptedTransport::x86_64_server());
    transport.push_reply("ok");
    let client = connect(&transport);

    let clamp = Kernel::new("clamp", &["x"], "max(min(x, 255), 0)");
    let input = Arc::new(PdArray::new("id_2", NumericType::Int32));
    let output = for_each(&client, &input, &clamp, true).unwrap();

    assert!(Arc::ptr_eq(&output, &input));
    let ir = transport
        .last_request(RUN_1D)
        .and_then(|c| c.params.get_str("func_ir").map(str::to_string))
        .unwrap();
    assert!(ir.contains("(i32 %x)"));
}
