use anyhow::Context;
use clap::Parser;
use php_vm::compiler::disasm::disassemble;
use php_vm::vm::executor::compile_source;
use std::fs;
use std::path::PathBuf;

/// Prints the bytecode of every function, method and class body of a script.
#[derive(Parser)]
#[command(name = "dump_bytecode")]
struct Cli {
    file: PathBuf,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let source = fs::read(&cli.file).with_context(|| format!("Could not open input file: {}", cli.file.display()))?;
    let file_name = cli.file.to_string_lossy().into_owned();
    let program = compile_source(&source, &file_name).map_err(|e| anyhow::anyhow!("{}", e))?;

    // Class bodies are listed under the chunk declaring them.
    if let Some(main) = &program.main {
        print!("{}", disassemble(&program.interner, main));
    }
    for func in program.functions.values() {
        print!("{}", disassemble(&program.interner, func));
    }
    Ok(())
}
