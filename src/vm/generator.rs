//! Generators
//!
//! Calling a function that contains `yield` does not run its body: the
//! bound frame is parked in a `Generator` object. Advancing the generator
//! pushes that frame back on the call stack and runs a nested dispatch loop
//! until the body yields or returns; `yield` pops the frame again and stores
//! it, operand stack and instruction pointer included, in the generator.
//!
//! ## States
//!
//! - **Created**: body not started; the first `current()`/`next()`/`send()`
//!   runs it to its first `yield`
//! - **Suspended**: parked at a `yield`
//! - **Running**: its frame is on the call stack
//! - **Finished**: returned or threw; the return value is kept for `getReturn()`
//!
//! A suspended frame does not hold its own generator object, so a
//! generator dies as soon as the last outside handle goes away. Destroying
//! one that is suspended inside `try` runs the pending `finally` bodies.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_generators.c` - zend_generator_resume, zend_generator_dtor_storage
//! - Zend: `$PHP_SRC_PATH/Zend/zend_vm_def.h` - ZEND_YIELD, ZEND_YIELD_FROM

use crate::core::value::{InternalState, ObjectRef, Tracer, Val};
use crate::vm::engine::{VM, VmError};
use crate::vm::frame::{Completion, Frame, IterState};
use crate::vm::opcode::YieldKind;
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorStatus {
    Created,
    Suspended,
    Running,
    Finished,
}

struct GeneratorInner {
    frame: Option<Frame>,
    status: GeneratorStatus,
    key: Val,
    value: Val,
    /// Next key for `yield $v`
    auto_key: i64,
    return_value: Option<Val>,
    /// Resumed past its first `yield`; such a generator cannot be rewound
    advanced: bool,
}

/// Payload of a `Generator` object.
pub struct GeneratorState {
    inner: RefCell<GeneratorInner>,
}

impl GeneratorState {
    fn new(frame: Frame) -> Self {
        Self {
            inner: RefCell::new(GeneratorInner {
                frame: Some(frame),
                status: GeneratorStatus::Created,
                key: Val::Null,
                value: Val::Null,
                auto_key: 0,
                return_value: None,
                advanced: false,
            }),
        }
    }

    pub fn status(&self) -> GeneratorStatus {
        self.inner.borrow().status
    }
}

impl InternalState for GeneratorState {
    fn trace(&self, tracer: &mut dyn Tracer) {
        let Ok(inner) = self.inner.try_borrow() else {
            return;
        };
        if let Some(frame) = &inner.frame {
            frame.trace(tracer);
        }
        tracer.value(&inner.key);
        tracer.value(&inner.value);
        if let Some(ret) = &inner.return_value {
            tracer.value(ret);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// How a suspended generator is resumed.
enum Resume {
    /// First run up to the first `yield`
    Start,
    /// Result of the pending `yield` expression (`next()` sends null)
    Value(Val),
    /// `throw()`: raise the exception at the pending `yield`
    Throw(ObjectRef),
}

impl VM {
    /// Parks the bound frame of a generator function in a new `Generator`.
    pub(crate) fn create_generator(&mut self, frame: Frame) -> Result<ObjectRef, VmError> {
        let class = self
            .program
            .class(self.program.sym.generator)
            .cloned()
            .ok_or_else(|| VmError::Fatal("Generator is not registered".into()))?;
        let obj = self.instantiate(&class)?;
        trace!(function = %self.sym_text(frame.func.name), object = obj.id(), "generator created");
        obj.set_internal(Rc::new(GeneratorState::new(frame)));
        Ok(obj)
    }

    fn generator_state(&mut self, obj: &ObjectRef) -> Result<Rc<GeneratorState>, VmError> {
        match obj.internal::<GeneratorState>() {
            Some(state) => Ok(state),
            None => Err(self.throw_error(b"Error", "The \"Generator\" class is reserved for internal use")),
        }
    }

    fn resume(&mut self, obj: &ObjectRef, input: Resume) -> Result<(), VmError> {
        let state = self.generator_state(obj)?;
        let status = state.status();
        match status {
            GeneratorStatus::Running => {
                return Err(self.throw_error(b"Error", "Cannot resume an already running generator"));
            }
            GeneratorStatus::Finished => {
                return match input {
                    Resume::Throw(exc) => Err(VmError::Thrown(exc)),
                    _ => Ok(()),
                };
            }
            GeneratorStatus::Created | GeneratorStatus::Suspended => {}
        }
        let frame = {
            let mut inner = state.inner.borrow_mut();
            if status == GeneratorStatus::Suspended {
                inner.advanced = true;
            }
            inner.status = GeneratorStatus::Running;
            inner.frame.take()
        };
        let Some(mut frame) = frame else {
            return Err(VmError::Fatal("Generator without a frame".into()));
        };
        if let Resume::Value(sent) = &input
            && status == GeneratorStatus::Suspended
        {
            frame.stack.push(sent.clone());
        }
        frame.generator = Some(obj.clone());
        let base = self.frames.len();
        if let Err(err) = self.push_frame(frame) {
            self.finish_generator(obj, None);
            return Err(err);
        }
        if let Resume::Throw(exc) = input {
            self.unwind(exc, base)?;
        }
        self.run_frames(base)?;
        Ok(())
    }

    fn generator_ensure_started(&mut self, obj: &ObjectRef) -> Result<(), VmError> {
        let state = self.generator_state(obj)?;
        if state.status() == GeneratorStatus::Created {
            self.resume(obj, Resume::Start)?;
        }
        Ok(())
    }

    /// `Generator::current()`
    pub fn generator_current(&mut self, obj: &ObjectRef) -> Result<Val, VmError> {
        self.generator_ensure_started(obj)?;
        let state = self.generator_state(obj)?;
        let inner = state.inner.borrow();
        Ok(inner.value.clone())
    }

    /// `Generator::key()`
    pub fn generator_key(&mut self, obj: &ObjectRef) -> Result<Val, VmError> {
        self.generator_ensure_started(obj)?;
        let state = self.generator_state(obj)?;
        let inner = state.inner.borrow();
        Ok(inner.key.clone())
    }

    /// `Generator::next()`
    pub fn generator_next(&mut self, obj: &ObjectRef) -> Result<(), VmError> {
        self.generator_ensure_started(obj)?;
        self.resume(obj, Resume::Value(Val::Null))
    }

    /// `Generator::send()`: the pending `yield` evaluates to `value`.
    pub fn generator_send(&mut self, obj: &ObjectRef, value: Val) -> Result<Val, VmError> {
        self.generator_ensure_started(obj)?;
        self.resume(obj, Resume::Value(value))?;
        self.generator_current(obj)
    }

    /// `Generator::throw()`
    pub fn generator_throw(&mut self, obj: &ObjectRef, exc: ObjectRef) -> Result<Val, VmError> {
        self.generator_ensure_started(obj)?;
        self.resume(obj, Resume::Throw(exc))?;
        self.generator_current(obj)
    }

    /// `Generator::valid()`
    pub fn generator_valid(&mut self, obj: &ObjectRef) -> Result<bool, VmError> {
        self.generator_ensure_started(obj)?;
        let state = self.generator_state(obj)?;
        Ok(state.status() != GeneratorStatus::Finished)
    }

    /// `Generator::rewind()`, also run when foreach starts on a generator.
    pub fn generator_rewind(&mut self, obj: &ObjectRef) -> Result<(), VmError> {
        self.generator_ensure_started(obj)?;
        let state = self.generator_state(obj)?;
        let advanced = state.inner.borrow().advanced;
        if advanced {
            return Err(self.throw_error(b"Exception", "Cannot rewind a generator that was already run"));
        }
        Ok(())
    }

    /// `Generator::getReturn()`
    pub fn generator_return(&mut self, obj: &ObjectRef) -> Result<Val, VmError> {
        let state = self.generator_state(obj)?;
        let ret = state.inner.borrow().return_value.clone();
        match ret {
            Some(val) => Ok(val),
            None => Err(self.throw_error(
                b"Exception",
                "Cannot get return value of a generator that hasn't returned",
            )),
        }
    }

    /// `Yield`: suspends the running generator body.
    pub(crate) fn op_yield(&mut self, kind: YieldKind, base: usize) -> Result<Option<Val>, VmError> {
        let value = self.pop()?.into_deref();
        let key = match kind {
            YieldKind::Auto => None,
            YieldKind::Keyed | YieldKind::Delegated => Some(self.pop()?.into_deref()),
        };
        let mut frame = self
            .frames
            .pop()
            .ok_or_else(|| VmError::Fatal("Yield without a frame".into()))?;
        let Some(generator) = frame.generator.take() else {
            return Err(VmError::Fatal("Cannot yield outside of a generator".into()));
        };
        let state = self.generator_state(&generator)?;
        let (old_key, old_value) = {
            let mut inner = state.inner.borrow_mut();
            let key = match key {
                None => {
                    let key = inner.auto_key;
                    inner.auto_key = inner.auto_key.saturating_add(1);
                    Val::Int(key)
                }
                Some(key) => {
                    if kind == YieldKind::Keyed
                        && let Val::Int(i) = key
                        && i >= inner.auto_key
                    {
                        inner.auto_key = i.saturating_add(1);
                    }
                    key
                }
            };
            inner.status = GeneratorStatus::Suspended;
            inner.frame = Some(frame);
            (
                std::mem::replace(&mut inner.key, key),
                std::mem::replace(&mut inner.value, value),
            )
        };
        drop(old_key);
        drop(old_value);
        if self.frames.len() <= base {
            return Ok(Some(Val::Null));
        }
        Ok(None)
    }

    /// Marks a generator as done: its frame is gone, `ret` is what it returned.
    pub(crate) fn finish_generator(&mut self, obj: &ObjectRef, ret: Option<Val>) {
        let Some(state) = obj.internal::<GeneratorState>() else {
            return;
        };
        let leftovers = {
            let mut inner = state.inner.borrow_mut();
            inner.status = GeneratorStatus::Finished;
            inner.return_value = ret;
            (
                inner.frame.take(),
                std::mem::take(&mut inner.key),
                std::mem::take(&mut inner.value),
            )
        };
        drop(leftovers);
    }

    /// Destruction of a generator: a body suspended inside `try` runs its
    /// `finally` bodies, as if it had returned from the `yield`.
    pub(crate) fn destroy_generator(&mut self, obj: &ObjectRef) -> Result<(), VmError> {
        let Some(state) = obj.internal::<GeneratorState>() else {
            return Ok(());
        };
        if state.status() != GeneratorStatus::Suspended {
            self.finish_generator(obj, None);
            return Ok(());
        }
        let Some(mut frame) = state.inner.borrow_mut().frame.take() else {
            return Ok(());
        };
        let pc = frame.pc();
        let chunk = frame.chunk.clone();
        let pending = chunk
            .try_regions
            .iter()
            .enumerate()
            .rev()
            .find(|(_, r)| (r.in_try(pc) || r.in_catch(pc)) && r.finally.is_some());
        let Some((idx, region)) = pending else {
            drop(frame);
            self.finish_generator(obj, None);
            return Ok(());
        };
        trace!(object = obj.id(), "generator destroyed inside try, running finally");
        frame.stack.clear();
        frame.calls.clear();
        frame.iterators.truncate(region.iter_depth as usize);
        frame.completions[idx] = Some(Completion::Return(Val::Null));
        frame.ip = region.finally.unwrap_or_default() as usize;
        frame.generator = Some(obj.clone());
        state.inner.borrow_mut().status = GeneratorStatus::Running;
        let base = self.frames.len();
        let result = match self.push_frame(frame) {
            Ok(()) => self.run_frames(base).map(drop),
            Err(err) => Err(err),
        };
        self.finish_generator(obj, None);
        result
    }

    // ---- yield from ----------------------------------------------------------

    /// `YieldFromInit`: starts delegating to an array, generator or
    /// Traversable. Jumps to `done` when there is nothing to yield.
    pub(crate) fn yield_from_init(&mut self, subject: Val, done: u32) -> Result<(), VmError> {
        let (iter, has_items) = match subject {
            Val::Array(array) => {
                let has_items = !array.is_empty();
                (IterState::Array { array, pos: 0 }, has_items)
            }
            Val::Object(obj) if obj.class().lname == self.program.sym.generator => {
                let running = self.frame()?.generator.as_ref().is_some_and(|g| g.ptr_eq(&obj));
                if running || self.generator_state(&obj)?.status() == GeneratorStatus::Running {
                    return Err(self.throw_error(
                        b"Error",
                        "Impossible to yield from the Generator being currently run",
                    ));
                }
                let has_items = self.generator_valid(&obj)?;
                (IterState::Generator { obj }, has_items)
            }
            Val::Object(obj) if obj.class().is_a(self.program.sym.traversable) => {
                let iter = self.resolve_iterator(&obj)?;
                self.start_iterator(iter)?
            }
            _ => {
                return Err(self.throw_error(b"Error", "Can use \"yield from\" only with arrays and Traversables"));
            }
        };
        let frame = self.frame_mut()?;
        frame.iterators.push(iter);
        if !has_items {
            frame.ip = done as usize;
        }
        Ok(())
    }

    /// `YieldFromNext`: forwards the value sent to the outer generator and
    /// jumps back to `next` while the delegate has more to yield.
    pub(crate) fn yield_from_next(&mut self, sent: Val, next: u32) -> Result<(), VmError> {
        let delegate = match self.frame()?.iterators.last() {
            Some(IterState::Generator { obj }) => Some(obj.clone()),
            _ => None,
        };
        let more = match delegate {
            Some(inner) => {
                if sent.is_null() {
                    self.generator_next(&inner)?;
                } else {
                    self.generator_send(&inner, sent)?;
                }
                self.generator_valid(&inner)?
            }
            None => self.iter_advance()?,
        };
        if more {
            self.frame_mut()?.ip = next as usize;
        }
        Ok(())
    }

    /// `YieldFromResult`: ends the delegation; a generator delegate
    /// provides its return value.
    pub(crate) fn yield_from_result(&mut self) -> Result<Val, VmError> {
        let iter = self.frame_mut()?.iterators.pop();
        match iter {
            Some(IterState::Generator { obj }) => {
                let state = self.generator_state(&obj)?;
                let ret = state.inner.borrow().return_value.clone();
                Ok(ret.unwrap_or_default())
            }
            _ => Ok(Val::Null),
        }
    }
}
