//! Local compilation through the native pipeline.
//!
//! Uses the machine running the tests as the target, with a private engine
//! so registrations can be observed.

use std::sync::Arc;
use xtarget::codegen::{CpuTarget, LocalCodegen, LocalEngine};
use xtarget::core::error::{CompileError, Error};
use xtarget::frontend::Kernel;
use xtarget::pipeline::{compile_kernel, CompileConfig, PipelineClass};
use xtarget::target::{HostToolchain, LocalTriple, NativeToolchain};

fn native_target(engine: &Arc<LocalEngine>) -> CpuTarget {
    let host: Arc<dyn HostToolchain> = Arc::new(NativeToolchain);
    CpuTarget::new(
        Arc::new(LocalCodegen::new("test.native", Arc::clone(&host), Arc::clone(engine))),
        Arc::new(LocalTriple(host)),
    )
}

#[test]
fn test_native_pipeline_emits_object() {
    let engine = Arc::new(LocalEngine::new());
    let target = native_target(&engine);
    let kernel = Kernel::new("poly", &["x"], "x * x + 2.0 * x + 1.0");

    let unit = compile_kernel(&target, &kernel, "float64(float64)", &CompileConfig::default()).unwrap();

    let object = unit.object_code.as_ref().expect("native pipeline emits an object");
    assert!(!object.is_empty());
    assert!(engine.registered_modules().contains(&unit.symbol_name));
    assert_eq!(
        engine.env(&format!("{}.env", unit.symbol_name)).as_deref(),
        Some("float64(float64)")
    );
    assert!(unit
        .ir_text
        .contains(&format!("target triple = \"{}\"", NativeToolchain.process_triple())));
}

#[test]
fn test_ir_pipeline_registers_without_object() {
    let engine = Arc::new(LocalEngine::new());
    let target = native_target(&engine);
    let kernel = Kernel::new("halve", &["x"], "x // 2");
    let config = CompileConfig {
        pipeline: PipelineClass::Ir,
        ..CompileConfig::default()
    };

    let unit = compile_kernel(&target, &kernel, "int64(int64)", &config).unwrap();

    assert!(unit.object_code.is_none());
    assert_eq!(engine.registered_modules(), vec![unit.symbol_name.clone()]);
}

#[test]
fn test_object_mode_rejected() {
    let engine = Arc::new(LocalEngine::new());
    let target = native_target(&engine);
    let config = CompileConfig {
        nopython: false,
        ..CompileConfig::default()
    };

    let result = compile_kernel(&target, &Kernel::new("k", &["x"], "x"), "int64(int64)", &config);
    assert!(matches!(result, Err(Error::Compile(CompileError::ObjectMode))));
    assert!(engine.registered_modules().is_empty());
}

#[test]
fn test_type_errors_surface() {
    let engine = Arc::new(LocalEngine::new());
    let target = native_target(&engine);

    let result = compile_kernel(
        &target,
        &Kernel::new("k", &["x"], "x + y"),
        "int64(int64)",
        &CompileConfig::default(),
    );
    assert!(matches!(
        result,
        Err(Error::Compile(CompileError::UnknownName { ref name })) if name == "y"
    ));

    let result = compile_kernel(
        &target,
        &Kernel::new("k", &["x"], "x"),
        "int64(complex128)",
        &CompileConfig::default(),
    );
    assert!(matches!(result, Err(Error::Compile(CompileError::UnknownType { .. }))));
}
