//! VM Engine Core
//!
//! The VM owns the linked [`Program`], the object store and the call stack,
//! and executes bytecode one instruction at a time.
//!
//! ## Architecture
//!
//! - **Frames**: every user call pushes a [`Frame`] holding its locals (one
//!   shared cell per slot), its operand stack and its pending calls.
//! - **Nested runs**: builtins and magic methods call back into user code
//!   through [`VM::call_pending`], which runs a nested dispatch loop until
//!   the pushed frame returns. Generators are resumed the same way.
//! - **Exceptions**: a throwing instruction returns [`VmError::Thrown`];
//!   the dispatch loop unwinds through the try regions of each frame,
//!   running finally bodies, until a catch matches or the base frame of the
//!   current run is left.
//! - **Destructors**: releasing the last handle of an object with
//!   `__destruct` parks it in the store; the loop drains that queue after
//!   every instruction, so destructors run at the point the object dies.
//!
//! ## Delegated Responsibilities
//!
//! - **Arithmetic, bitwise, comparison**: [`opcodes`](crate::vm::opcodes)
//! - **Calls**: [`callable`](crate::vm::callable)
//! - **Classes, constants, static properties**: [`class_resolution`](crate::vm::class_resolution)
//! - **Properties**: [`object_helpers`](crate::vm::object_helpers)
//! - **Variables and lvalues**: [`variable_ops`](crate::vm::variable_ops)
//! - **Generators and foreach**: [`generator`](crate::vm::generator), [`iteration`](crate::vm::iteration)
//!
//! ## References
//!
//! - Zend VM: `$PHP_SRC_PATH/Zend/zend_execute.c` - Main execution loop
//! - Exceptions: `$PHP_SRC_PATH/Zend/zend_exceptions.c`
//! - Object store: `$PHP_SRC_PATH/Zend/zend_objects_API.c`

use crate::compiler::error::CompileError;
use crate::core::gc;
use crate::core::heap::ObjectStore;
use crate::core::value::{ArrayData, ObjectRef, Reference, Symbol, Val};
use crate::runtime::context::{ClassDef, Program};
use crate::vm::frame::Frame;
use crate::vm::opcode::{ArithOp, OpCode};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::{self, Write};
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, trace, warn};

/// Nested dispatch loops (builtins calling back into user code) allowed at once.
const MAX_NESTED_RUNS: usize = 256;
/// Instructions between two checks of the time and instruction limits.
const LIMIT_CHECK_INTERVAL: u64 = 1000;

#[derive(Debug)]
pub enum VmError {
    /// A PHP exception in flight; user code may still catch it
    Thrown(ObjectRef),
    /// An exception nobody caught
    Exception(UncaughtException),
    /// Time, instruction or call-depth budget exhausted
    ResourceLimit(String),
    Compile(CompileError),
    Parse(String),
    /// `exit()` with its status
    Exit(i32),
    /// Unrecoverable engine error
    Fatal(String),
    Output(String),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::Thrown(obj) => write!(f, "Exception object #{} in flight", obj.id()),
            VmError::Exception(uncaught) => uncaught.fmt(f),
            VmError::ResourceLimit(msg) => write!(f, "PHP Fatal error:  {}", msg),
            VmError::Compile(err) => write!(f, "PHP Fatal error:  {}", err),
            VmError::Parse(msg) => write!(f, "PHP Parse error:  {}", msg),
            VmError::Exit(status) => write!(f, "exit({})", status),
            VmError::Fatal(msg) => write!(f, "PHP Fatal error:  {}", msg),
            VmError::Output(msg) => write!(f, "Output error: {}", msg),
        }
    }
}

impl std::error::Error for VmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            VmError::Compile(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CompileError> for VmError {
    fn from(err: CompileError) -> Self {
        VmError::Compile(err)
    }
}

/// Diagnostic of an exception that reached the top of the script.
#[derive(Debug, Clone, PartialEq)]
pub struct UncaughtException {
    pub class: String,
    pub message: String,
    pub file: String,
    pub line: i64,
    /// `getTraceAsString()` of the exception
    pub trace: String,
}

impl fmt::Display for UncaughtException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = if self.message.is_empty() {
            self.class.clone()
        } else {
            format!("{}: {}", self.class, self.message)
        };
        write!(
            f,
            "PHP Fatal error:  Uncaught {} in {}:{}\nStack trace:\n{}\n  thrown in {} on line {}",
            head, self.file, self.line, self.trace, self.file, self.line
        )
    }
}

pub trait OutputWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<(), VmError>;
    fn flush(&mut self) -> Result<(), VmError> {
        Ok(())
    }
}

/// Buffered stdout writer to avoid excessive syscalls
pub struct StdoutWriter {
    stdout: io::BufWriter<io::Stdout>,
}

impl Default for StdoutWriter {
    fn default() -> Self {
        Self {
            stdout: io::BufWriter::new(io::stdout()),
        }
    }
}

impl OutputWriter for StdoutWriter {
    fn write(&mut self, bytes: &[u8]) -> Result<(), VmError> {
        self.stdout
            .write_all(bytes)
            .map_err(|e| VmError::Output(format!("Failed to write output: {}", e)))
    }

    fn flush(&mut self) -> Result<(), VmError> {
        self.stdout
            .flush()
            .map_err(|e| VmError::Output(format!("Failed to flush output: {}", e)))
    }
}

/// Capturing output writer for testing
pub struct CapturingOutputWriter<F: FnMut(&[u8])> {
    callback: F,
}

impl<F: FnMut(&[u8])> CapturingOutputWriter<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F: FnMut(&[u8])> OutputWriter for CapturingOutputWriter<F> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), VmError> {
        (self.callback)(bytes);
        Ok(())
    }
}

/// Execution budgets enforced by the dispatch loop.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// 0 = unlimited
    pub max_instructions: u64,
    pub deadline: Option<Instant>,
    pub max_call_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_instructions: 0,
            deadline: None,
            max_call_depth: 10_000,
        }
    }
}

/// Kind of magic property access guarded against recursion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum GuardKind {
    Get,
    Set,
    Isset,
    Unset,
}

pub struct VM {
    pub program: Program,
    pub store: Rc<ObjectStore>,
    pub frames: Vec<Frame>,
    /// Global symbol table; the main script's named slots live here
    pub globals: IndexMap<Symbol, Reference>,
    pub limits: Limits,
    pub instructions_executed: u64,
    pub function_calls: u64,
    /// Treat every file as `declare(strict_types=1)`
    pub force_strict_types: bool,
    pub exit_status: i32,
    output: Box<dyn OutputWriter>,
    nested_runs: usize,
    lower_cache: HashMap<Symbol, Symbol>,
    /// Active `__get`/`__set`/`__isset`/`__unset` calls: (object, property, kind)
    pub(crate) guards: HashSet<(usize, Symbol, GuardKind)>,
}

impl VM {
    pub fn new(program: Program) -> Self {
        Self {
            program,
            store: ObjectStore::new(),
            frames: Vec::new(),
            globals: IndexMap::new(),
            limits: Limits::default(),
            instructions_executed: 0,
            function_calls: 0,
            force_strict_types: false,
            exit_status: 0,
            output: Box::new(StdoutWriter::default()),
            nested_runs: 0,
            lower_cache: HashMap::new(),
            guards: HashSet::new(),
        }
    }

    pub fn set_output_writer(&mut self, writer: Box<dyn OutputWriter>) {
        self.output = writer;
    }

    pub fn echo(&mut self, bytes: &[u8]) -> Result<(), VmError> {
        self.output.write(bytes)
    }

    pub fn flush_output(&mut self) -> Result<(), VmError> {
        self.output.flush()
    }

    /// Binds a global variable before the script starts.
    pub fn set_global(&mut self, name: &[u8], value: Val) {
        let sym = self.program.interner.intern(name);
        match self.globals.get(&sym) {
            Some(cell) => cell.set(value),
            None => {
                self.globals.insert(sym, Reference::new(value));
            }
        }
    }

    pub fn global(&self, name: &[u8]) -> Option<Val> {
        let sym = self.program.interner.find(name)?;
        self.globals.get(&sym).map(Reference::get)
    }

    /// Runs the compiled main script, then the shutdown sequence.
    ///
    /// Returns the value of a top-level `return`, or null.
    pub fn run(&mut self) -> Result<Val, VmError> {
        self.enter_main()?;
        let result = self.run_frames(0);
        let result: Result<Val, VmError> = match result {
            Ok(val) => Ok(val),
            Err(VmError::Exit(status)) => {
                self.exit_status = status;
                Ok(Val::Null)
            }
            Err(VmError::Thrown(exc)) => {
                let uncaught = self.describe_uncaught(&exc);
                warn!(class = %uncaught.class, message = %uncaught.message, "uncaught exception");
                self.exit_status = 255;
                self.frames.clear();
                self.store.disable_release();
                drop(exc);
                let _ = self.flush_output();
                return Err(VmError::Exception(uncaught));
            }
            Err(other) => {
                self.frames.clear();
                self.store.disable_release();
                let _ = self.flush_output();
                return Err(other);
            }
        };
        let value = result?;
        match self.shutdown() {
            Ok(()) | Err(VmError::Exit(_)) => {}
            Err(VmError::Thrown(exc)) => {
                let uncaught = self.describe_uncaught(&exc);
                self.store.disable_release();
                let _ = self.flush_output();
                return Err(VmError::Exception(uncaught));
            }
            Err(other) => return Err(other),
        }
        self.flush_output()?;
        Ok(value)
    }

    /// Runs the compiled main script and keeps the globals alive, so the
    /// next fragment compiled into the same program sees them. Used by the
    /// interactive shell.
    pub fn run_fragment(&mut self) -> Result<Val, VmError> {
        self.enter_main()?;
        match self.run_frames(0) {
            Ok(val) => {
                self.flush_output()?;
                Ok(val)
            }
            Err(VmError::Exit(status)) => {
                self.exit_status = status;
                self.flush_output()?;
                Err(VmError::Exit(status))
            }
            Err(VmError::Thrown(exc)) => {
                let uncaught = self.describe_uncaught(&exc);
                self.frames.clear();
                drop(exc);
                self.flush_output()?;
                Err(VmError::Exception(uncaught))
            }
            Err(other) => {
                self.frames.clear();
                let _ = self.flush_output();
                Err(other)
            }
        }
    }

    /// Pushes the `{main}` frame, binding its named slots to the globals.
    fn enter_main(&mut self) -> Result<(), VmError> {
        let main = self
            .program
            .main
            .clone()
            .ok_or_else(|| VmError::Fatal("No script compiled".into()))?;
        let mut frame = Frame::new(main);
        frame.is_main = true;
        for (slot, name) in frame.chunk.local_names.iter().enumerate() {
            let Some(name) = name else { continue };
            let cell = self
                .globals
                .entry(*name)
                .or_insert_with(|| Reference::new(Val::Uninitialized))
                .clone();
            frame.locals[slot] = cell;
        }
        self.frames.push(frame);
        Ok(())
    }

    /// Releases the globals in reverse order, collects cycles and runs the
    /// destructors of whatever is still alive.
    fn shutdown(&mut self) -> Result<(), VmError> {
        debug!(live = self.store.live_count(), "shutdown");
        while let Some((_, cell)) = self.globals.pop() {
            let value = cell.take();
            drop(cell);
            drop(value);
            self.run_destructors()?;
        }
        self.collect_cycles()?;
        for obj in self.store.live_objects() {
            if obj.wants_release() && !obj.mark_destructed() {
                self.destruct(&obj)?;
            }
        }
        Ok(())
    }

    /// Lowercased twin of a symbol, cached.
    pub fn lower(&mut self, sym: Symbol) -> Symbol {
        if let Some(lower) = self.lower_cache.get(&sym) {
            return *lower;
        }
        let text = self.program.interner.text(sym).to_vec();
        let lower = self.program.interner.intern_lower(&text);
        self.lower_cache.insert(sym, lower);
        lower
    }

    pub fn sym_text(&self, sym: Symbol) -> String {
        self.program.display(sym)
    }

    pub fn class_name(&self, class: &ClassDef) -> String {
        self.program.class_display(class)
    }

    // ---- frame and stack access --------------------------------------------

    pub(crate) fn frame(&self) -> Result<&Frame, VmError> {
        self.frames
            .last()
            .ok_or_else(|| VmError::Fatal("No active frame".into()))
    }

    pub(crate) fn frame_mut(&mut self) -> Result<&mut Frame, VmError> {
        self.frames
            .last_mut()
            .ok_or_else(|| VmError::Fatal("No active frame".into()))
    }

    pub(crate) fn push(&mut self, val: Val) -> Result<(), VmError> {
        self.frame_mut()?.stack.push(val);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> Result<Val, VmError> {
        self.frame_mut()?
            .stack
            .pop()
            .ok_or_else(|| VmError::Fatal("Operand stack underflow".into()))
    }

    /// Pops `n` values, returned in push order.
    pub(crate) fn pop_n(&mut self, n: usize) -> Result<Vec<Val>, VmError> {
        let stack = &mut self.frame_mut()?.stack;
        if stack.len() < n {
            return Err(VmError::Fatal("Operand stack underflow".into()));
        }
        let at = stack.len() - n;
        Ok(stack.split_off(at))
    }

    pub(crate) fn peek(&self) -> Result<&Val, VmError> {
        self.frame()?
            .stack
            .last()
            .ok_or_else(|| VmError::Fatal("Operand stack underflow".into()))
    }

    pub(crate) fn current_scope(&self) -> Option<Rc<ClassDef>> {
        self.frames.last().and_then(|f| f.scope.clone())
    }

    pub(crate) fn current_this(&self) -> Option<ObjectRef> {
        self.frames.last().and_then(|f| f.this.clone())
    }

    /// Strict typing mode of the code currently executing.
    pub(crate) fn strict_types(&self) -> bool {
        self.force_strict_types || self.frames.last().is_some_and(|f| f.chunk.strict_types)
    }

    pub(crate) fn current_line(&self) -> u32 {
        self.frames.last().map(Frame::line).unwrap_or(0)
    }

    // ---- dispatch loop ----------------------------------------------------

    /// Runs until the frame at index `base` returns (or yields, for a
    /// generator body). Exceptions leaving that frame are returned as
    /// [`VmError::Thrown`].
    pub(crate) fn run_frames(&mut self, base: usize) -> Result<Val, VmError> {
        if self.nested_runs >= MAX_NESTED_RUNS {
            self.abort_frames(base);
            return Err(VmError::ResourceLimit(
                "Maximum function nesting level reached".into(),
            ));
        }
        self.nested_runs += 1;
        let result = self.dispatch(base);
        self.nested_runs -= 1;
        result
    }

    fn dispatch(&mut self, base: usize) -> Result<Val, VmError> {
        loop {
            let outcome = self.step(base);
            let outcome = match outcome {
                Ok(Some(val)) => {
                    self.run_destructors()?;
                    return Ok(val);
                }
                Ok(None) => self.run_destructors(),
                Err(err) => Err(err),
            };
            match outcome {
                Ok(()) => {}
                Err(VmError::Thrown(exc)) => self.unwind(exc, base)?,
                Err(other) => {
                    self.abort_frames(base);
                    return Err(other);
                }
            }
            if self.instructions_executed % LIMIT_CHECK_INTERVAL == 0
                && let Err(err) = self.check_limits()
            {
                warn!(%err, "execution aborted");
                self.abort_frames(base);
                return Err(err);
            }
        }
    }

    fn check_limits(&self) -> Result<(), VmError> {
        if self.limits.max_instructions > 0 && self.instructions_executed >= self.limits.max_instructions {
            return Err(VmError::ResourceLimit(format!(
                "Instruction budget of {} exhausted",
                self.limits.max_instructions
            )));
        }
        if let Some(deadline) = self.limits.deadline
            && Instant::now() >= deadline
        {
            return Err(VmError::ResourceLimit(
                "Maximum execution time exceeded".into(),
            ));
        }
        Ok(())
    }

    /// Drops the frames of a run that ends with a fatal error.
    fn abort_frames(&mut self, base: usize) {
        while self.frames.len() > base {
            if let Some(frame) = self.frames.pop()
                && let Some(generator) = &frame.generator
            {
                self.finish_generator(generator, None);
            }
        }
    }

    /// Pushes a frame for a call, enforcing the call-depth limit.
    pub(crate) fn push_frame(&mut self, frame: Frame) -> Result<(), VmError> {
        if self.frames.len() >= self.limits.max_call_depth {
            return Err(VmError::ResourceLimit(format!(
                "Maximum call stack depth of {} reached",
                self.limits.max_call_depth
            )));
        }
        trace!(function = %self.sym_text(frame.func.name), depth = self.frames.len(), "frame push");
        self.function_calls += 1;
        self.frames.push(frame);
        Ok(())
    }

    fn step(&mut self, base: usize) -> Result<Option<Val>, VmError> {
        let frame = self.frame_mut()?;
        let Some(op) = frame.chunk.code.get(frame.ip).copied() else {
            return Err(VmError::Fatal("Instruction pointer out of range".into()));
        };
        frame.ip += 1;
        self.instructions_executed += 1;

        match op {
            OpCode::Nop => {}
            OpCode::Const(idx) => {
                let frame = self.frame_mut()?;
                let val = frame.chunk.constants.get(idx as usize).cloned().unwrap_or_default();
                frame.stack.push(val);
            }
            OpCode::Null => self.push(Val::Null)?,
            OpCode::Pop => {
                self.pop()?;
            }
            OpCode::Dup => {
                let top = self.peek()?.clone();
                self.push(top)?;
            }

            OpCode::LoadLocal(slot) => {
                let frame = self.frame_mut()?;
                let val = match frame.locals.get(slot as usize).map(Reference::get) {
                    Some(Val::Uninitialized) | None => Val::Null,
                    Some(v) => v,
                };
                frame.stack.push(val);
            }
            OpCode::LoadThis => match self.current_this() {
                Some(this) => self.push(Val::Object(this))?,
                None => {
                    return Err(self.throw_error(b"Error", "Using $this when not in object context"));
                }
            },
            OpCode::AssignLocal(slot) => {
                let val = self.pop()?.into_deref();
                let frame = self.frame_mut()?;
                let cell = frame
                    .locals
                    .get(slot as usize)
                    .cloned()
                    .ok_or_else(|| VmError::Fatal("Local slot out of range".into()))?;
                let old = std::mem::replace(&mut *cell.borrow_mut(), val.clone());
                frame.stack.push(val);
                drop(old);
            }
            OpCode::Assign { place, depth } => self.op_assign(place, depth)?,
            OpCode::AssignOp { place, depth, op } => self.op_assign_op(place, depth, op)?,
            OpCode::IncDec { place, depth, kind } => self.op_inc_dec(place, depth, kind)?,
            OpCode::AssignRef { place, depth } => self.op_assign_ref(place, depth)?,
            OpCode::MakeRef { place, depth } => {
                let cell = self.make_ref(place, depth)?;
                self.push(Val::Ref(cell))?;
            }
            OpCode::Unset { place, depth } => self.op_unset(place, depth)?,
            OpCode::IssetLocal { slot, empty } => {
                let frame = self.frame()?;
                let val = frame.locals.get(slot as usize).map(Reference::get).unwrap_or_default();
                let result = if empty { !val.to_bool() } else { !val.is_null() };
                self.push(Val::Bool(result))?;
            }
            OpCode::IssetDim { empty } => {
                let key = self.pop()?;
                let container = self.pop()?;
                let result = self.isset_dim(&container, &key, empty)?;
                self.push(Val::Bool(result))?;
            }
            OpCode::IssetProp { name, empty } => {
                let obj = self.pop()?;
                let result = self.isset_prop(&obj, name, empty)?;
                self.push(Val::Bool(result))?;
            }
            OpCode::IssetPropDynamic { empty } => {
                let name = self.pop()?;
                let obj = self.pop()?;
                let name = self.property_name(&name)?;
                let result = self.isset_prop(&obj, name, empty)?;
                self.push(Val::Bool(result))?;
            }
            OpCode::IssetStaticProp { class, name, empty } => {
                let class = self.resolve_class_ref(class)?;
                let result = match self.find_static_prop(&class, name, false)? {
                    Some(cell) => {
                        let val = cell.get();
                        if empty { !val.to_bool() } else { !val.is_null() }
                    }
                    None => empty,
                };
                self.push(Val::Bool(result))?;
            }
            OpCode::BindGlobal { slot, name } => {
                let cell = self
                    .globals
                    .entry(name)
                    .or_insert_with(|| Reference::new(Val::Null))
                    .clone();
                let frame = self.frame_mut()?;
                if let Some(local) = frame.locals.get_mut(slot as usize) {
                    *local = cell;
                }
            }
            OpCode::StaticInit { slot, index, skip } => {
                let frame = self.frame_mut()?;
                let existing = frame.func.statics.borrow().get(index as usize).cloned().flatten();
                if let Some(cell) = existing {
                    if let Some(local) = frame.locals.get_mut(slot as usize) {
                        *local = cell;
                    }
                    frame.ip = skip as usize;
                }
            }
            OpCode::StaticBind { slot, index } => {
                let val = self.pop()?.into_deref();
                let frame = self.frame_mut()?;
                let cell = Reference::new(val);
                {
                    let mut statics = frame.func.statics.borrow_mut();
                    let index = index as usize;
                    if statics.len() <= index {
                        statics.resize(index + 1, None);
                    }
                    statics[index] = Some(cell.clone());
                }
                if let Some(local) = frame.locals.get_mut(slot as usize) {
                    *local = cell;
                }
            }

            OpCode::Add => self.binary_arith(ArithOp::Add)?,
            OpCode::Sub => self.binary_arith(ArithOp::Sub)?,
            OpCode::Mul => self.binary_arith(ArithOp::Mul)?,
            OpCode::Div => self.binary_arith(ArithOp::Div)?,
            OpCode::Mod => self.binary_arith(ArithOp::Mod)?,
            OpCode::Pow => self.binary_arith(ArithOp::Pow)?,
            OpCode::Concat => self.binary_arith(ArithOp::Concat)?,
            OpCode::BitwiseAnd => self.binary_arith(ArithOp::BitAnd)?,
            OpCode::BitwiseOr => self.binary_arith(ArithOp::BitOr)?,
            OpCode::BitwiseXor => self.binary_arith(ArithOp::BitXor)?,
            OpCode::ShiftLeft => self.binary_arith(ArithOp::Shl)?,
            OpCode::ShiftRight => self.binary_arith(ArithOp::Shr)?,
            OpCode::ConcatN(n) => {
                let parts = self.pop_n(n as usize)?;
                let mut out = Vec::new();
                for part in &parts {
                    out.extend_from_slice(&self.to_string_bytes(part)?);
                }
                self.push(Val::string(out))?;
            }
            OpCode::BitwiseNot => {
                let val = self.pop()?;
                let result = self.bitwise_not(&val)?;
                self.push(result)?;
            }
            OpCode::Negate => {
                let val = self.pop()?;
                let result = self.arith(ArithOp::Mul, &val, &Val::Int(-1))?;
                self.push(result)?;
            }
            OpCode::UnaryPlus => {
                let val = self.pop()?;
                let result = self.arith(ArithOp::Mul, &val, &Val::Int(1))?;
                self.push(result)?;
            }

            OpCode::IsEqual => self.binary_compare(|vm, a, b| Ok(Val::Bool(vm.loose_equals(a, b)?)))?,
            OpCode::IsNotEqual => self.binary_compare(|vm, a, b| Ok(Val::Bool(!vm.loose_equals(a, b)?)))?,
            OpCode::IsIdentical => self.binary_compare(|_, a, b| Ok(Val::Bool(strict_equals(a, b))))?,
            OpCode::IsNotIdentical => self.binary_compare(|_, a, b| Ok(Val::Bool(!strict_equals(a, b))))?,
            OpCode::IsLess => self.binary_compare(|vm, a, b| Ok(Val::Bool(vm.compare(a, b)? < 0)))?,
            OpCode::IsLessOrEqual => self.binary_compare(|vm, a, b| Ok(Val::Bool(vm.compare(a, b)? <= 0)))?,
            OpCode::IsGreater => self.binary_compare(|vm, a, b| Ok(Val::Bool(vm.compare(b, a)? < 0)))?,
            OpCode::IsGreaterOrEqual => {
                self.binary_compare(|vm, a, b| Ok(Val::Bool(vm.compare(b, a)? <= 0)))?
            }
            OpCode::Spaceship => self.binary_compare(|vm, a, b| Ok(Val::Int(vm.compare(a, b)?)))?,

            OpCode::BoolNot => {
                let val = self.pop()?;
                self.push(Val::Bool(!val.to_bool()))?;
            }
            OpCode::BoolXor => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Val::Bool(a.to_bool() ^ b.to_bool()))?;
            }
            OpCode::ToBool => {
                let val = self.pop()?;
                self.push(Val::Bool(val.to_bool()))?;
            }
            OpCode::Cast(ty) => {
                let val = self.pop()?;
                let result = self.cast(val, ty)?;
                self.push(result)?;
            }

            OpCode::Jmp(target) => self.frame_mut()?.ip = target as usize,
            OpCode::JmpIfFalse(target) => {
                if !self.pop()?.to_bool() {
                    self.frame_mut()?.ip = target as usize;
                }
            }
            OpCode::JmpIfTrue(target) => {
                if self.pop()?.to_bool() {
                    self.frame_mut()?.ip = target as usize;
                }
            }
            OpCode::JmpZEx(target) => {
                let frame = self.frame_mut()?;
                let truthy = frame.stack.last().is_some_and(Val::to_bool);
                if truthy {
                    frame.stack.pop();
                } else {
                    if let Some(top) = frame.stack.last_mut() {
                        *top = Val::Bool(false);
                    }
                    frame.ip = target as usize;
                }
            }
            OpCode::JmpNzEx(target) => {
                let frame = self.frame_mut()?;
                let truthy = frame.stack.last().is_some_and(Val::to_bool);
                if truthy {
                    if let Some(top) = frame.stack.last_mut() {
                        *top = Val::Bool(true);
                    }
                    frame.ip = target as usize;
                } else {
                    frame.stack.pop();
                }
            }
            OpCode::Coalesce(target) => {
                let frame = self.frame_mut()?;
                if frame.stack.last().is_some_and(|v| !v.is_null()) {
                    frame.ip = target as usize;
                } else {
                    frame.stack.pop();
                }
            }
            OpCode::JmpNull(target) => {
                let frame = self.frame_mut()?;
                if frame.stack.last().is_some_and(Val::is_null) {
                    if let Some(top) = frame.stack.last_mut() {
                        *top = Val::Null;
                    }
                    frame.ip = target as usize;
                }
            }
            OpCode::JmpFinally(target) => self.jump_through_finally(target)?,
            OpCode::FinallyEnd(region) => return self.finally_end(region, base),

            OpCode::NewArray(capacity) => {
                let array = ArrayData::with_capacity(capacity as usize);
                self.push(Val::Array(Rc::new(array)))?;
            }
            OpCode::ArrayPush => self.op_array_push()?,
            OpCode::ArrayInsert => self.op_array_insert()?,
            OpCode::ArraySpread => self.op_array_spread()?,
            OpCode::FetchDim { quiet } => {
                let key = self.pop()?;
                let container = self.pop()?;
                let val = self.fetch_dim(&container, &key, quiet)?;
                self.push(val)?;
            }

            OpCode::FetchConst(name) => {
                let val = self.fetch_constant(name)?;
                self.push(val)?;
            }
            OpCode::DeclareConst(name) => {
                let val = self.pop()?.into_deref();
                if !self.program.constants.contains_key(&name) {
                    self.program.constants.insert(name, val);
                }
            }

            OpCode::InitFcall { name, lname } => self.init_fcall(name, lname)?,
            OpCode::InitCallable => {
                let callable = self.pop()?.into_deref();
                let call = self.callable_to_call(&callable)?;
                self.frame_mut()?.calls.push(call);
            }
            OpCode::InitMethodCall(name) => {
                let obj = self.pop()?.into_deref();
                self.init_method_call(obj, name)?;
            }
            OpCode::InitMethodCallDynamic => {
                let name = self.pop()?.into_deref();
                let obj = self.pop()?.into_deref();
                let name = self.member_name(&name, "method")?;
                self.init_method_call(obj, name)?;
            }
            OpCode::InitStaticCall { class, name } => self.init_static_call(class, name)?,
            OpCode::InitStaticCallDynamic(class) => {
                let name = self.pop()?.into_deref();
                let name = self.member_name(&name, "method")?;
                self.init_static_call(class, name)?;
            }
            OpCode::InitNew(class) => self.init_new(class)?,
            OpCode::SendVal => {
                let val = self.pop()?;
                self.send_val(val)?;
            }
            OpCode::SendPlace { place, depth } => self.send_place(place, depth)?,
            OpCode::SendNamed(name) => {
                let val = self.pop()?.into_deref();
                let call = self
                    .frame_mut()?
                    .calls
                    .last_mut()
                    .ok_or_else(|| VmError::Fatal("Argument without a call".into()))?;
                call.named.push((name, val));
            }
            OpCode::SendUnpack => {
                let val = self.pop()?.into_deref();
                self.send_unpack(val)?;
            }
            OpCode::DoCall => self.do_call()?,
            OpCode::MakeCallableClosure => {
                let call = self
                    .frame_mut()?
                    .calls
                    .pop()
                    .ok_or_else(|| VmError::Fatal("No call to wrap in a closure".into()))?;
                let closure = self.closure_from_call(call)?;
                self.push(Val::Object(closure))?;
            }
            OpCode::RecvDefault { param, skip } => {
                let frame = self.frame_mut()?;
                let supplied = frame
                    .locals
                    .get(param as usize)
                    .is_some_and(|cell| !matches!(*cell.borrow(), Val::Uninitialized));
                if supplied {
                    frame.ip = skip as usize;
                }
            }
            OpCode::Return => {
                let val = self.pop()?.into_deref();
                return self.do_return(val, base);
            }

            OpCode::DeclareFunction(idx) => self.declare_function(idx)?,
            OpCode::DeclareClass(idx) => self.declare_class(idx)?,
            OpCode::MakeClosure { func, captures } => self.make_closure(func, captures)?,

            OpCode::FetchProp { name, quiet } => {
                let obj = self.pop()?.into_deref();
                let val = self.read_prop(&obj, name, quiet)?;
                self.push(val)?;
            }
            OpCode::FetchPropDynamic { quiet } => {
                let name = self.pop()?.into_deref();
                let obj = self.pop()?.into_deref();
                let name = self.property_name(&name)?;
                let val = self.read_prop(&obj, name, quiet)?;
                self.push(val)?;
            }
            OpCode::FetchStaticProp { class, name } => {
                let class = self.resolve_class_ref(class)?;
                let cell = self.static_prop_cell(&class, name)?;
                self.push(cell.get())?;
            }
            OpCode::FetchClassConst { class, name } => {
                let class = self.resolve_class_ref(class)?;
                let val = self.class_constant(&class, name)?;
                self.push(val)?;
            }
            OpCode::ClassName(class) => {
                let class = self.resolve_class_ref(class)?;
                let name = self.program.interner.text(class.name).to_vec();
                self.push(Val::string(name))?;
            }
            OpCode::InstanceOf(class) => {
                let result = self.op_instanceof(class)?;
                self.push(Val::Bool(result))?;
            }
            OpCode::Clone => {
                let val = self.pop()?.into_deref();
                let cloned = self.clone_value(&val)?;
                self.push(cloned)?;
            }

            OpCode::IterInit { end, by_ref } => {
                let subject = self.pop()?;
                self.iter_init(subject, end, by_ref)?;
            }
            OpCode::IterKey => {
                let key = self.iter_key()?;
                self.push(key)?;
            }
            OpCode::IterValue => {
                let val = self.iter_value()?;
                self.push(val)?;
            }
            OpCode::IterNext(target) => self.iter_next(target)?,
            OpCode::IterFree => {
                let iter = self.frame_mut()?.iterators.pop();
                drop(iter);
            }
            OpCode::YieldFromInit(done) => {
                let subject = self.pop()?.into_deref();
                self.yield_from_init(subject, done)?;
            }
            OpCode::YieldFromNext(next) => {
                let sent = self.pop()?;
                self.yield_from_next(sent, next)?;
            }
            OpCode::YieldFromResult => {
                let result = self.yield_from_result()?;
                self.push(result)?;
            }

            OpCode::Yield(kind) => return self.op_yield(kind, base),

            OpCode::Throw => {
                let val = self.pop()?.into_deref();
                return Err(self.throw_value(val));
            }
            OpCode::MatchError => {
                let val = self.pop()?.into_deref();
                let shown = self.match_subject_display(&val);
                return Err(self.throw_error(b"UnhandledMatchError", format!("Unhandled match case {}", shown)));
            }

            OpCode::Echo => {
                let val = self.pop()?;
                let bytes = self.to_string_bytes(&val)?;
                self.echo(&bytes)?;
            }
            OpCode::Exit => {
                let val = self.pop()?.into_deref();
                let status = match &val {
                    Val::Int(i) => *i as i32,
                    Val::Null => 0,
                    other => {
                        let bytes = self.to_string_bytes(other)?;
                        self.echo(&bytes)?;
                        0
                    }
                };
                return Err(VmError::Exit(status));
            }
        }
        Ok(None)
    }

    fn binary_arith(&mut self, op: ArithOp) -> Result<(), VmError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let result = self.arith(op, &a, &b)?;
        self.push(result)
    }

    fn binary_compare(
        &mut self,
        f: impl FnOnce(&mut Self, &Val, &Val) -> Result<Val, VmError>,
    ) -> Result<(), VmError> {
        let b = self.pop()?.into_deref();
        let a = self.pop()?.into_deref();
        let result = f(self, &a, &b)?;
        self.push(result)
    }

    fn fetch_constant(&mut self, name: Symbol) -> Result<Val, VmError> {
        if let Some(val) = self.program.constants.get(&name) {
            return Ok(val.clone());
        }
        // true/false/null and the builtin constants are case-insensitive
        let lower = self.lower(name);
        let text = self.program.interner.text(lower).to_vec();
        match text.as_slice() {
            b"true" => return Ok(Val::Bool(true)),
            b"false" => return Ok(Val::Bool(false)),
            b"null" => return Ok(Val::Null),
            _ => {}
        }
        let shown = self.sym_text(name);
        Err(self.throw_error(b"Error", format!("Undefined constant \"{}\"", shown)))
    }

    // ---- destructors and cycles ------------------------------------------

    /// Runs `__destruct` for every object released since the last call.
    pub(crate) fn run_destructors(&mut self) -> Result<(), VmError> {
        while self.store.has_pending() {
            for obj in self.store.take_pending() {
                self.destruct(&obj)?;
            }
        }
        Ok(())
    }

    /// Destroys one object: generators run their pending finally bodies,
    /// other objects get `__destruct`.
    pub(crate) fn destruct(&mut self, obj: &ObjectRef) -> Result<(), VmError> {
        if obj.class().lname == self.program.sym.generator {
            return self.destroy_generator(obj);
        }
        let destruct = self.program.sym.destruct;
        let Some(method) = obj.class().find_method(destruct).cloned() else {
            return Ok(());
        };
        trace!(object = obj.id(), "destructor");
        self.call_method_entry(Some(obj.clone()), obj.class().clone(), &method, Vec::new())?;
        Ok(())
    }

    /// `gc_collect_cycles()`: destructs and frees garbage cycles.
    pub fn collect_cycles(&mut self) -> Result<usize, VmError> {
        let garbage = gc::find_garbage(&self.store);
        if garbage.is_empty() {
            return Ok(0);
        }
        debug!(objects = garbage.len(), "collecting cycles");
        for obj in &garbage {
            if obj.wants_release() && !obj.mark_destructed() {
                self.destruct(obj)?;
            }
        }
        // Our handles would count as external references in the second pass.
        let ids: Vec<u32> = garbage.iter().map(ObjectRef::id).collect();
        drop(garbage);
        // Destructors may have stored garbage somewhere reachable again.
        let collect: Vec<ObjectRef> = gc::find_garbage(&self.store)
            .into_iter()
            .filter(|o| ids.contains(&o.id()))
            .collect();
        gc::break_cycles(&collect);
        let count = collect.len();
        drop(collect);
        self.run_destructors()?;
        Ok(count)
    }
}

/// `===`
pub fn strict_equals(a: &Val, b: &Val) -> bool {
    match (a, b) {
        (Val::Ref(r), other) | (other, Val::Ref(r)) => strict_equals(&r.get(), other),
        (Val::Null | Val::Uninitialized, Val::Null | Val::Uninitialized) => true,
        (Val::Bool(x), Val::Bool(y)) => x == y,
        (Val::Int(x), Val::Int(y)) => x == y,
        (Val::Float(x), Val::Float(y)) => x == y,
        (Val::String(x), Val::String(y)) => x == y,
        (Val::Array(x), Val::Array(y)) => {
            Rc::ptr_eq(x, y)
                || (x.len() == y.len()
                    && x.map.iter().zip(y.map.iter()).all(|((ka, va), (kb, vb))| {
                        ka == kb && strict_equals(va, vb)
                    }))
        }
        (Val::Object(x), Val::Object(y)) => x.ptr_eq(y),
        (Val::Resource(x), Val::Resource(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}
