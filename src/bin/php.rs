use anyhow::Context;
use bumpalo::Bump;
use clap::Parser;
use php_vm::compiler;
use php_vm::core::value::{ArrayData, Val};
use php_vm::parser;
use php_vm::runtime::context::Program;
use php_vm::vm::engine::{OutputWriter, StdoutWriter, VM, VmError};
use php_vm::vm::executor::{ExecutionConfig, execute_code_with_config};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::cell::RefCell;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "php")]
#[command(about = "Run PHP scripts on a bytecode virtual machine", long_about = None)]
struct Cli {
    /// Run interactively
    #[arg(short = 'a', long)]
    interactive: bool,

    /// Run code given on the command line, without `<?php`
    #[arg(short = 'r', long = "run", value_name = "CODE")]
    code: Option<String>,

    /// Print the parsed syntax tree of FILE as JSON and exit
    #[arg(long)]
    dump_ast: bool,

    /// Treat every file as `declare(strict_types=1)`
    #[arg(long)]
    strict_types: bool,

    /// Maximum execution time in milliseconds, 0 for none
    #[arg(long, default_value_t = 0)]
    timeout_ms: u64,

    /// Maximum number of executed instructions, 0 for none
    #[arg(long, default_value_t = 0)]
    max_instructions: u64,

    /// Maximum depth of nested calls
    #[arg(long)]
    max_call_depth: Option<usize>,

    /// Script file to run
    #[arg(name = "FILE")]
    file: Option<PathBuf>,

    /// Arguments to pass to the script
    #[arg(allow_hyphen_values = true, trailing_var_arg = true)]
    args: Vec<String>,
}

impl Cli {
    fn config(&self, file_name: &str, argv: Vec<String>) -> ExecutionConfig {
        let mut config = ExecutionConfig {
            timeout_ms: self.timeout_ms,
            max_instructions: self.max_instructions,
            capture_output: false,
            strict_types: self.strict_types,
            file_name: file_name.to_string(),
            ..Default::default()
        };
        if let Some(depth) = self.max_call_depth {
            config.max_call_depth = depth;
        }
        let argc = argv.len() as i64;
        let argv: Vec<Val> = argv.into_iter().map(|a| Val::string(a.into_bytes())).collect();
        config.globals.insert("argv".to_string(), Val::Array(Rc::new(ArrayData::from(argv))));
        config.globals.insert("argc".to_string(), Val::Int(argc));
        config
    }
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(status) => ExitCode::from(status),
        Err(err) => {
            eprintln!("{:#}", err);
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<u8> {
    if cli.interactive {
        run_repl()?;
        return Ok(0);
    }
    if let Some(code) = &cli.code {
        let source = format!("<?php {}", code);
        let mut argv = vec!["Standard input code".to_string()];
        argv.extend(cli.args.iter().cloned());
        return Ok(execute(&source, cli.config("Command line code", argv)));
    }
    let Some(path) = cli.file.clone() else {
        use clap::CommandFactory;
        Cli::command().print_help()?;
        return Ok(0);
    };
    let source = fs::read(&path).with_context(|| format!("Could not open input file: {}", path.display()))?;
    if cli.dump_ast {
        dump_ast(&source)?;
        return Ok(0);
    }
    let source = String::from_utf8(source).with_context(|| format!("{} is not valid UTF-8", path.display()))?;
    let script_name = path.to_string_lossy().into_owned();
    let mut argv = vec![script_name.clone()];
    argv.extend(cli.args.iter().cloned());
    Ok(execute(&source, cli.config(&script_name, argv)))
}

/// Runs a script and maps the outcome to a process status, reporting
/// errors on stderr the way the PHP CLI does.
fn execute(source: &str, config: ExecutionConfig) -> u8 {
    match execute_code_with_config(source, config) {
        Ok(result) => {
            debug!(duration_us = result.duration_us, "script finished");
            result.exit_status.clamp(0, 255) as u8
        }
        Err(VmError::Exception(uncaught)) => {
            eprintln!("{}", uncaught);
            255
        }
        Err(err) => {
            eprintln!("{}", err);
            255
        }
    }
}

fn dump_ast(source: &[u8]) -> anyhow::Result<()> {
    let arena = Bump::new();
    let program = parser::parse(source, &arena);
    let json = serde_json::to_string_pretty(&program).context("failed to serialize the syntax tree")?;
    println!("{}", json);
    Ok(())
}

// ---- interactive shell ---------------------------------------------------

#[derive(Default)]
struct ReplOutputState {
    wrote_output: bool,
    last_byte: Option<u8>,
}

impl ReplOutputState {
    fn reset(&mut self) {
        self.wrote_output = false;
        self.last_byte = None;
    }

    fn note_write(&mut self, bytes: &[u8]) {
        if let Some(&last) = bytes.last() {
            self.wrote_output = true;
            self.last_byte = Some(last);
        }
    }

    fn needs_trailing_newline(&self) -> bool {
        self.wrote_output && self.last_byte != Some(b'\n')
    }
}

struct TrackingOutputWriter<W: OutputWriter> {
    inner: W,
    state: Rc<RefCell<ReplOutputState>>,
}

impl<W: OutputWriter> TrackingOutputWriter<W> {
    fn new(inner: W, state: Rc<RefCell<ReplOutputState>>) -> Self {
        Self { inner, state }
    }
}

impl<W: OutputWriter> OutputWriter for TrackingOutputWriter<W> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), VmError> {
        self.state.borrow_mut().note_write(bytes);
        self.inner.write(bytes)
    }

    fn flush(&mut self) -> Result<(), VmError> {
        self.inner.flush()
    }
}

fn append_repl_trailing_newline_if_needed(
    vm: &mut VM,
    output_state: &Rc<RefCell<ReplOutputState>>,
) -> Result<(), VmError> {
    if output_state.borrow().needs_trailing_newline() {
        vm.echo(b"\n")?;
        vm.flush_output()?;
    }
    Ok(())
}

/// Decodes a line of a readline history file (`\040` is a space).
fn decode_readline_history_line(line: &str) -> String {
    let mut result = String::new();
    let mut chars = line.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            let next: String = chars.clone().take(3).collect();
            if next.len() == 3
                && next.chars().all(|c| c.is_digit(8))
                && let Ok(code) = u8::from_str_radix(&next, 8)
            {
                result.push(code as char);
                chars.nth(2);
                continue;
            }
        }
        result.push(ch);
    }
    result
}

fn encode_readline_history_line(line: &str) -> String {
    let mut result = String::new();
    for ch in line.chars() {
        match ch {
            ' ' => result.push_str("\\040"),
            '\t' => result.push_str("\\011"),
            '\n' => result.push_str("\\012"),
            '\r' => result.push_str("\\015"),
            '\\' => result.push_str("\\134"),
            _ => result.push(ch),
        }
    }
    result
}

/// Loads `~/.php_history`, which uses the readline v2 format.
fn load_readline_history(path: &Path, editor: &mut DefaultEditor) -> anyhow::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    let reader = BufReader::new(fs::File::open(path)?);
    for line in reader.lines() {
        let line = line?;
        if line == "_HiStOrY_V2_" {
            continue;
        }
        let decoded = decode_readline_history_line(&line);
        if !decoded.is_empty() {
            editor.add_history_entry(&decoded)?;
        }
    }
    Ok(())
}

fn save_readline_history(path: &Path, editor: &DefaultEditor) -> anyhow::Result<()> {
    let mut file = fs::File::create(path)?;
    writeln!(file, "_HiStOrY_V2_")?;
    for entry in editor.history().iter() {
        writeln!(file, "{}", encode_readline_history_line(entry))?;
    }
    Ok(())
}

/// Compiles one line into the shell's program and runs it. Functions,
/// classes and globals persist across lines.
fn execute_fragment(vm: &mut VM, line: &str) -> Result<(), VmError> {
    let source = if line.starts_with("<?php") {
        line.to_string()
    } else {
        format!("<?php {}", line)
    };
    let arena = Bump::new();
    let ast = parser::parse(source.as_bytes(), &arena);
    if let Some(err) = ast.errors.first() {
        return Err(VmError::Parse(err.to_human_readable(source.as_bytes())));
    }
    compiler::compile_into(&mut vm.program, source.as_bytes(), &ast)?;
    vm.run_fragment().map(|_| ())
}

fn run_repl() -> anyhow::Result<()> {
    let mut rl = DefaultEditor::new()?;
    let history_path = std::env::var("HOME")
        .map(|home| PathBuf::from(home).join(".php_history"))
        .unwrap_or_else(|_| PathBuf::from(".php_history"));
    if let Err(e) = load_readline_history(&history_path, &mut rl) {
        eprintln!("Warning: Could not load history: {}", e);
    }

    println!("Interactive shell");
    println!("Type 'exit' or 'quit' to quit");

    let mut program = Program::new();
    program.file_name = b"php shell code".to_vec();
    let mut vm = VM::new(program);
    let output_state = Rc::new(RefCell::new(ReplOutputState::default()));
    vm.set_output_writer(Box::new(TrackingOutputWriter::new(
        StdoutWriter::default(),
        output_state.clone(),
    )));

    loop {
        match rl.readline("php > ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "exit" || line == "quit" {
                    break;
                }
                rl.add_history_entry(line)?;
                output_state.borrow_mut().reset();
                match execute_fragment(&mut vm, line) {
                    Ok(()) => {}
                    Err(VmError::Exit(_)) => break,
                    Err(err) => eprintln!("{}", err),
                }
                if let Err(e) = append_repl_trailing_newline_if_needed(&mut vm, &output_state) {
                    eprintln!("{}", e);
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {}", err);
                break;
            }
        }
    }

    if let Err(e) = save_readline_history(&history_path, &rl) {
        eprintln!("Warning: Could not save history: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Collect(Rc<RefCell<Vec<u8>>>);

    impl OutputWriter for Collect {
        fn write(&mut self, bytes: &[u8]) -> Result<(), VmError> {
            self.0.borrow_mut().extend_from_slice(bytes);
            Ok(())
        }
    }

    fn shell() -> (VM, Rc<RefCell<Vec<u8>>>, Rc<RefCell<ReplOutputState>>) {
        let mut vm = VM::new(Program::new());
        let buffer = Rc::new(RefCell::new(Vec::new()));
        let state = Rc::new(RefCell::new(ReplOutputState::default()));
        vm.set_output_writer(Box::new(TrackingOutputWriter::new(Collect(buffer.clone()), state.clone())));
        (vm, buffer, state)
    }

    #[test]
    fn repl_appends_newline_when_output_has_no_trailing_newline() {
        let (mut vm, buffer, state) = shell();
        execute_fragment(&mut vm, "echo 123;").unwrap();
        append_repl_trailing_newline_if_needed(&mut vm, &state).unwrap();
        assert_eq!(buffer.borrow().as_slice(), b"123\n");
    }

    #[test]
    fn repl_keeps_variables_and_functions_between_lines() {
        let (mut vm, buffer, _) = shell();
        execute_fragment(&mut vm, "$x = 20; function twice($n) { return $n * 2; }").unwrap();
        execute_fragment(&mut vm, "echo twice($x) + 2;").unwrap();
        assert_eq!(buffer.borrow().as_slice(), b"42");
    }

    #[test]
    fn repl_recovers_after_uncaught_exception() {
        let (mut vm, buffer, _) = shell();
        let err = execute_fragment(&mut vm, "throw new RuntimeException('boom');").unwrap_err();
        assert!(matches!(err, VmError::Exception(ref u) if u.message == "boom"));
        execute_fragment(&mut vm, "echo 'still here';").unwrap();
        assert_eq!(buffer.borrow().as_slice(), b"still here");
    }

    #[test]
    fn history_lines_round_trip() {
        let line = r"echo 'a b\c';";
        assert_eq!(decode_readline_history_line(&encode_readline_history_line(line)), line);
    }
}
