//! Numeric semantics of compiled kernels.
//!
//! Kernels are compiled through the IR pipeline for the local machine, the
//! IR text is parsed back and JIT-executed, and results are compared with
//! numpy scalar behavior.

use inkwell::context::Context;
use inkwell::execution_engine::JitFunction;
use inkwell::memory_buffer::MemoryBuffer;
use inkwell::targets::{InitializationConfig, Target};
use inkwell::OptimizationLevel;
use std::sync::Arc;
use xtarget::codegen::{CpuTarget, LocalCodegen, LocalEngine};
use xtarget::frontend::Kernel;
use xtarget::pipeline::{compile_kernel, CompileConfig, CompiledUnit, PipelineClass};
use xtarget::target::{HostToolchain, LocalTriple, NativeToolchain};

type I64Binary = unsafe extern "C" fn(i64, i64) -> i64;
type F64Binary = unsafe extern "C" fn(f64, f64) -> f64;
type F64Unary = unsafe extern "C" fn(f64) -> f64;
type I64Predicate = unsafe extern "C" fn(i64) -> u8;

fn compile_ir(params: &[&str], body: &str, signature: &str) -> CompiledUnit {
    let host: Arc<dyn HostToolchain> = Arc::new(NativeToolchain);
    let target = CpuTarget::new(
        Arc::new(LocalCodegen::new("test.jit", Arc::clone(&host), Arc::new(LocalEngine::new()))),
        Arc::new(LocalTriple(host)),
    );
    let config = CompileConfig {
        pipeline: PipelineClass::Ir,
        ..CompileConfig::default()
    };
    compile_kernel(&target, &Kernel::new("k", params, body), signature, &config).unwrap()
}

/// Compile, JIT and hand the function to `check`.
fn with_jit<F: inkwell::execution_engine::UnsafeFunctionPointer>(
    params: &[&str],
    body: &str,
    signature: &str,
    check: impl FnOnce(JitFunction<'_, F>),
) {
    Target::initialize_native(&InitializationConfig::default()).unwrap();
    let unit = compile_ir(params, body, signature);

    let context = Context::create();
    let buffer = MemoryBuffer::create_from_memory_range_copy(unit.ir_text.as_bytes(), "kernel");
    let module = context.create_module_from_ir(buffer).unwrap();
    let engine = module.create_jit_execution_engine(OptimizationLevel::None).unwrap();
    let function = unsafe { engine.get_function::<F>(&unit.symbol_name) }.unwrap();
    check(function);
}

#[test]
fn test_floor_division_and_modulo() {
    with_jit::<I64Binary>(&["a", "b"], "a // b", "int64(int64, int64)", |f| unsafe {
        assert_eq!(f.call(7, 2), 3);
        assert_eq!(f.call(-7, 2), -4);
        assert_eq!(f.call(7, -2), -4);
        assert_eq!(f.call(7, 0), 0);
        assert_eq!(f.call(i64::MIN, -1), i64::MIN);
    });

    with_jit::<I64Binary>(&["a", "b"], "a % b", "int64(int64, int64)", |f| unsafe {
        assert_eq!(f.call(7, 3), 1);
        assert_eq!(f.call(-7, 3), 2);
        assert_eq!(f.call(7, -3), -2);
        assert_eq!(f.call(7, 0), 0);
        assert_eq!(f.call(5, -1), 0);
    });
}

#[test]
fn test_float_semantics() {
    with_jit::<F64Binary>(&["a", "b"], "a % b", "float64(float64, float64)", |f| unsafe {
        assert_eq!(f.call(-7.5, 2.0), 0.5);
        assert_eq!(f.call(7.5, -2.0), -0.5);
    });

    with_jit::<F64Binary>(&["a", "b"], "a // b", "float64(float64, float64)", |f| unsafe {
        assert_eq!(f.call(-7.0, 2.0), -4.0);
    });

    with_jit::<F64Unary>(&["x"], "where(x < 0, -x, sqrt(x))", "float64(float64)", |f| unsafe {
        assert_eq!(f.call(-3.0), 3.0);
        assert_eq!(f.call(16.0), 4.0);
    });
}

#[test]
fn test_true_division_of_integers() {
    type Divide = unsafe extern "C" fn(i64, i64) -> f64;
    with_jit::<Divide>(&["a", "b"], "a / b", "float64(int64, int64)", |f| unsafe {
        assert_eq!(f.call(7, 2), 3.5);
        assert!(f.call(1, 0).is_infinite());
    });
}

#[test]
fn test_bool_result() {
    with_jit::<I64Predicate>(&["x"], "x % 2 == 0", "bool(int64)", |f| unsafe {
        assert_eq!(f.call(4), 1);
        assert_eq!(f.call(5), 0);
        assert_eq!(f.call(-3), 0);
    });
}

#[test]
fn test_builtins() {
    with_jit::<I64Binary>(&["a", "b"], "abs(min(a, b)) + max(a, b)", "int64(int64, int64)", |f| unsafe {
        assert_eq!(f.call(-5, 3), 8);
        assert_eq!(f.call(2, 9), 11);
    });

    with_jit::<F64Unary>(&["x"], "floor(exp(log(x)) + 0.25)", "float64(float64)", |f| unsafe {
        assert_eq!(f.call(2.0), 2.0);
    });
}
