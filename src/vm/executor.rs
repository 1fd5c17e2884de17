//! Centralized Code Execution API
//!
//! Parses, compiles and runs a PHP source string in a fresh VM with
//! configurable limits. Both binaries and the test suite go through here.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use php_vm::vm::executor::{execute_code, execute_code_with_config, ExecutionConfig};
//!
//! let result = execute_code("<?php echo 'hi'; return 42;").unwrap();
//! assert_eq!(result.stdout, "hi");
//!
//! let config = ExecutionConfig { max_instructions: 10_000, ..Default::default() };
//! let result = execute_code_with_config("<?php while (true) {}", config);
//! assert!(matches!(result, Err(VmError::ResourceLimit(_))));
//! ```

use crate::compiler;
use crate::core::value::Val;
use crate::parser;
use crate::runtime::context::Program;
use crate::vm::engine::{CapturingOutputWriter, Limits, VM, VmError};
use bumpalo::Bump;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of executing PHP code
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// Value of a top-level `return`, null otherwise
    pub value: Val,
    /// Captured output, empty when capture is disabled
    pub stdout: String,
    /// `exit()` status, 0 when the script ran to its end
    pub exit_status: i32,
    /// Execution time in microseconds
    pub duration_us: u64,
    /// Number of instructions executed (if profiling enabled)
    pub opcodes_executed: Option<u64>,
    /// Number of user function calls made (if profiling enabled)
    pub function_calls: Option<u64>,
}

/// Configuration for code execution
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    /// Maximum execution time in milliseconds (0 = unlimited)
    pub timeout_ms: u64,
    /// Maximum number of instructions (0 = unlimited)
    pub max_instructions: u64,
    /// Maximum depth of nested user calls
    pub max_call_depth: usize,
    /// Initial global variables
    pub globals: HashMap<String, Val>,
    /// Capture output into `ExecutionResult::stdout` instead of writing to stdout
    pub capture_output: bool,
    /// Enable profiling (instructions, function calls)
    pub enable_profiling: bool,
    /// Run as if the file declared `strict_types=1`
    pub strict_types: bool,
    /// Name reported by `__FILE__`, exceptions and stack traces
    pub file_name: String,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_instructions: 0,
            max_call_depth: Limits::default().max_call_depth,
            globals: HashMap::new(),
            capture_output: true,
            enable_profiling: false,
            strict_types: false,
            file_name: "Standard input code".to_string(),
        }
    }
}

impl ExecutionConfig {
    /// Budgets for the dispatch loop; the deadline starts counting now.
    pub fn limits(&self) -> Limits {
        Limits {
            max_instructions: self.max_instructions,
            deadline: (self.timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(self.timeout_ms)),
            max_call_depth: self.max_call_depth,
        }
    }
}

/// Parses and compiles `source` into a program ready to run.
///
/// Syntax errors surface as [`VmError::Parse`] carrying the first error and
/// its line; compile and link errors as [`VmError::Compile`].
pub fn compile_source(source: &[u8], file_name: &str) -> Result<Program, VmError> {
    let arena = Bump::new();
    let ast = parser::parse(source, &arena);
    if let Some(err) = ast.errors.first() {
        let line = err.span.line_info(source).map(|info| info.line).unwrap_or(0);
        return Err(VmError::Parse(format!(
            "{} in {} on line {}",
            err.message, file_name, line
        )));
    }
    let mut program = Program::new();
    program.file_name = file_name.as_bytes().to_vec();
    compiler::compile_into(&mut program, source, &ast)?;
    Ok(program)
}

/// Execute PHP code with default configuration
///
/// Code must contain the full `<?php` opening tag.
pub fn execute_code(code: &str) -> Result<ExecutionResult, VmError> {
    execute_code_with_config(code, ExecutionConfig::default())
}

/// Execute PHP code with custom configuration
pub fn execute_code_with_config(source: &str, config: ExecutionConfig) -> Result<ExecutionResult, VmError> {
    let start = Instant::now();
    let program = compile_source(source.as_bytes(), &config.file_name)?;

    let mut vm = VM::new(program);
    vm.limits = config.limits();
    vm.force_strict_types = config.strict_types;
    for (name, value) in &config.globals {
        vm.set_global(name.as_bytes(), value.clone());
    }

    let captured = Rc::new(RefCell::new(Vec::<u8>::new()));
    if config.capture_output {
        let sink = captured.clone();
        vm.set_output_writer(Box::new(CapturingOutputWriter::new(move |bytes| {
            sink.borrow_mut().extend_from_slice(bytes);
        })));
    }

    let value = vm.run()?;
    let duration_us = start.elapsed().as_micros() as u64;
    debug!(
        instructions = vm.instructions_executed,
        calls = vm.function_calls,
        duration_us,
        "execution finished"
    );

    let stdout = String::from_utf8_lossy(&captured.borrow()).into_owned();
    Ok(ExecutionResult {
        value,
        stdout,
        exit_status: vm.exit_status,
        duration_us,
        opcodes_executed: config.enable_profiling.then_some(vm.instructions_executed),
        function_calls: config.enable_profiling.then_some(vm.function_calls),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_execution() {
        let result = execute_code("<?php return 42;").unwrap();
        assert!(matches!(result.value, Val::Int(42)));
    }

    #[test]
    fn test_string_operations() {
        let result = execute_code("<?php return 'hello' . ' world';").unwrap();
        match result.value {
            Val::String(s) => assert_eq!(s.as_slice(), b"hello world"),
            other => panic!("Expected string, got {:?}", other),
        }
    }

    #[test]
    fn test_with_globals() {
        let mut config = ExecutionConfig::default();
        config.globals.insert("x".to_string(), Val::Int(10));
        config.globals.insert("y".to_string(), Val::Int(5));
        let result = execute_code_with_config("<?php return $x + $y;", config).unwrap();
        assert!(matches!(result.value, Val::Int(15)));
    }

    #[test]
    fn test_parse_error() {
        let result = execute_code("<?php return syntax error here;");
        assert!(matches!(result, Err(VmError::Parse(_))));
    }

    #[test]
    fn test_output_capture() {
        let result = execute_code("<?php echo 'output'; return 42;").unwrap();
        assert_eq!(result.stdout, "output");
        assert!(matches!(result.value, Val::Int(42)));
    }

    #[test]
    fn test_instruction_budget() {
        let config = ExecutionConfig {
            max_instructions: 5_000,
            ..Default::default()
        };
        let result = execute_code_with_config("<?php while (true) {}", config);
        assert!(matches!(result, Err(VmError::ResourceLimit(_))));
    }

    #[test]
    fn test_timeout_infinite_loop() {
        let config = ExecutionConfig {
            timeout_ms: 50,
            ..Default::default()
        };
        match execute_code_with_config("<?php while (true) {}", config) {
            Err(VmError::ResourceLimit(msg)) => assert!(msg.contains("Maximum execution time")),
            other => panic!("Expected resource limit, got {:?}", other.map(|r| r.value)),
        }
    }

    #[test]
    fn test_call_depth_limit() {
        let config = ExecutionConfig {
            max_call_depth: 50,
            ..Default::default()
        };
        let result = execute_code_with_config("<?php function f($n) { return f($n + 1); } f(0);", config);
        assert!(matches!(result, Err(VmError::ResourceLimit(_))));
    }

    #[test]
    fn test_profiling() {
        let config = ExecutionConfig {
            enable_profiling: true,
            ..Default::default()
        };
        let result = execute_code_with_config("<?php function f() { return 1; } return f() + f();", config).unwrap();
        assert!(result.opcodes_executed.is_some_and(|n| n > 0));
        assert_eq!(result.function_calls, Some(2));
        assert_eq!(execute_code("<?php return 1;").unwrap().opcodes_executed, None);
    }

    #[test]
    fn test_exit_status() {
        let result = execute_code("<?php echo 'a'; exit(3); echo 'b';").unwrap();
        assert_eq!(result.stdout, "a");
        assert_eq!(result.exit_status, 3);
    }

    #[test]
    fn test_forced_strict_types() {
        let config = ExecutionConfig {
            strict_types: true,
            ..Default::default()
        };
        let result = execute_code_with_config("<?php function f(int $x) { return $x; } f('5');", config);
        match result {
            Err(VmError::Exception(uncaught)) => assert_eq!(uncaught.class, "TypeError"),
            other => panic!("Expected TypeError, got {:?}", other.map(|r| r.value)),
        }
    }
}
