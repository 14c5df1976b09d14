//! Offline IR generator.
//!
//! Compiles one kernel to target-tagged LLVM IR for a machine described on
//! the command line, without contacting a server. The output is exactly
//! what `ir_compile` would ship for a server with those properties.

use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use xtarget::dispatch::{compile, DispatchOptions};
use xtarget::frontend::Kernel;
use xtarget::remote::{Client, OfflineTransport};

#[derive(Parser)]
#[command(name = "xtarget-ir", version, about = "Compile a kernel to LLVM IR for a remote CPU")]
struct Cli {
    #[arg(long, help = "Kernel name, used in the emitted symbol")]
    name: String,

    #[arg(long, help = "Signature such as `float64(float64, int64)`")]
    signature: String,

    #[arg(long, value_delimiter = ',', help = "Comma separated parameter names")]
    params: Vec<String>,

    #[arg(long, help = "Kernel body expression")]
    body: String,

    #[arg(long, default_value = "x86_64-unknown-linux-gnu", help = "Target triple of the server")]
    triple: String,

    #[arg(
        long,
        default_value = "e-m:e-p270:32:32-p271:32:32-p272:64:64-i64:64-i128:128-f80:128-n8:16:32:64-S128",
        help = "Data layout of the server"
    )]
    layout: String,

    #[arg(long, default_value = "x86-64", help = "CPU name of the server")]
    cpu: String,

    #[arg(long, default_value = "+sse2", help = "CPU features of the server, e.g. `+avx2,+fma`")]
    features: String,

    #[arg(long, short, help = "Write IR here instead of stdout")]
    output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Cli::parse();

    let transport = OfflineTransport {
        host: args.cpu,
        triple: args.triple,
        layout: args.layout,
        cpu_features: args.features,
    };
    let client = Client::new(Arc::new(transport));

    let params: Vec<&str> = args.params.iter().map(String::as_str).collect();
    let kernel = Kernel::new(&args.name, &params, &args.body);

    let unit = compile(&client, &kernel, &DispatchOptions::new(&args.signature))?;
    log::info!("emitted {} ({} bytes)", unit.symbol_name, unit.ir_text.len());

    match args.output {
        Some(path) => fs::write(&path, &unit.ir_text)?,
        None => print!("{}", unit.ir_text),
    }
    Ok(())
}
