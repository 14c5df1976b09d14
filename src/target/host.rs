// This module describes the client's own toolchain and the process-triple strategy. The
// front-end asks "what is the ambient triple" for decisions that don't go through the code
// generator, such as the width of `intp`. Rather than patching a global accessor for the
// duration of a remote compilation, the answer comes from a TripleSource object stored in
// the CpuTarget: LocalTriple reports the LLVM host triple, RemoteTriple reports the cached
// server triple. NativeToolchain reads the host facts from LLVM through inkwell.

//! Local toolchain facts and process-triple sources.

use super::descriptor::RemoteTarget;
use crate::core::error::Result;
use inkwell::targets::TargetMachine;
use std::sync::Arc;

/// What the client's LLVM reports about the machine it runs on.
pub trait HostToolchain: Send + Sync {
    /// Host CPU model name, e.g. `skylake`.
    fn cpu_name(&self) -> String;

    /// Comma separated `+name`/`-name` features the local LLVM knows.
    fn cpu_features(&self) -> String;

    /// The local process triple.
    fn process_triple(&self) -> String;
}

/// The LLVM host, as seen through inkwell.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeToolchain;

impl HostToolchain for NativeToolchain {
    fn cpu_name(&self) -> String {
        TargetMachine::get_host_cpu_name().to_string()
    }

    fn cpu_features(&self) -> String {
        TargetMachine::get_host_cpu_features().to_string()
    }

    fn process_triple(&self) -> String {
        TargetMachine::get_default_triple()
            .as_str()
            .to_string_lossy()
            .into_owned()
    }
}

/// Strategy answering "what triple is this process compiling for".
pub trait TripleSource: Send + Sync {
    fn process_triple(&self) -> Result<String>;
}

/// The local toolchain's own triple.
pub struct LocalTriple(pub Arc<dyn HostToolchain>);

impl TripleSource for LocalTriple {
    fn process_triple(&self) -> Result<String> {
        Ok(self.0.process_triple())
    }
}

/// The remote server's triple, fetched through its descriptor cache.
pub struct RemoteTriple(pub Arc<RemoteTarget>);

impl TripleSource for RemoteTriple {
    fn process_triple(&self) -> Result<String> {
        Ok(self.0.triple()?.to_string())
    }
}

/// Pointer width in bits implied by a target triple.
///
/// ILP32 ABIs on 64-bit architectures (`x32`, `arm64_32`, aarch64 `ilp32`,
/// mips `n32`) are recognized from the architecture or environment name.
pub fn pointer_width(triple: &str) -> u32 {
    let mut components = triple.split('-');
    let arch = components.next().unwrap_or("");
    let ilp32 = ["x32", "ilp32", "abin32"];
    if components.any(|part| ilp32.iter().any(|suffix| part.ends_with(suffix))) {
        return 32;
    }
    match arch {
        "i386" | "i486" | "i586" | "i686" | "x86" | "arm" | "armeb" | "thumb" | "thumbeb"
        | "mips" | "mipsel" | "powerpc" | "ppc" | "riscv32" | "sparc" | "wasm32" | "hexagon"
        | "m68k" | "xtensa" | "arm64_32" | "aarch64_32" => 32,
        a if a.starts_with("armv") || a.starts_with("thumbv") => 32,
        _ => 64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_width() {
        assert_eq!(pointer_width("x86_64-pc-linux-gnu"), 64);
        assert_eq!(pointer_width("aarch64-unknown-linux-gnu"), 64);
        assert_eq!(pointer_width("i686-pc-windows-msvc"), 32);
        assert_eq!(pointer_width("armv7-unknown-linux-gnueabihf"), 32);
        assert_eq!(pointer_width("wasm32-wasi"), 32);
    }

    #[test]
    fn test_pointer_width_ilp32_abis() {
        assert_eq!(pointer_width("x86_64-pc-linux-gnux32"), 32);
        assert_eq!(pointer_width("x86_64-unknown-linux-muslx32"), 32);
        assert_eq!(pointer_width("arm64_32-apple-watchos"), 32);
        assert_eq!(pointer_width("aarch64_32-apple-watchos"), 32);
        assert_eq!(pointer_width("aarch64-unknown-linux-gnu_ilp32"), 32);
        assert_eq!(pointer_width("mips64el-unknown-linux-gnuabin32"), 32);
        assert_eq!(pointer_width("x86_64-unknown-linux-musl"), 64);
        assert_eq!(pointer_width("mips64el-unknown-linux-gnuabi64"), 64);
    }
}
