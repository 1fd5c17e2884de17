//! Control flow across try regions
//!
//! Leaving a guarded block early (`return`, `break`, `continue`, an
//! exception) must run the enclosing `finally` bodies first. The frame
//! records the pending exit as a [`Completion`] for the region whose finally
//! body runs, and `FinallyEnd` resumes that exit afterwards.
//!
//! ## Rules
//!
//! - An exception thrown in a try body is matched against the region's
//!   catch handlers by class; without a match the finally body runs and the
//!   exception continues outward when it ends.
//! - An exception thrown in a catch body skips the other handlers of the
//!   same region but still runs its finally body.
//! - A new exit from inside a finally body (throw, return, jump) replaces
//!   the completion recorded for that region. A replaced exception becomes
//!   the end of the new exception's `previous` chain.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_vm_def.h` - ZEND_HANDLE_EXCEPTION, ZEND_FAST_CALL, ZEND_FAST_RET

use crate::core::value::{ObjectRef, Symbol, Val};
use crate::vm::engine::{VM, VmError};
use crate::vm::frame::{Completion, Frame};
use crate::vm::type_conversion::TypeScope;
use tracing::trace;

/// Where an exception lands inside a frame.
enum Landing {
    Catch { region: usize, target: u32 },
    Finally { region: usize, target: u32 },
}

fn find_landing(frame: &mut Frame, exc: &ObjectRef, previous: Symbol) -> Option<Landing> {
    let pc = frame.pc();
    let chunk = frame.chunk.clone();
    for (idx, region) in chunk.try_regions.iter().enumerate().rev() {
        if !region.contains(pc) {
            continue;
        }
        if region.in_try(pc) {
            for handler in &region.catches {
                if handler.types.iter().any(|t| exc.class().is_a(*t)) {
                    return Some(Landing::Catch {
                        region: idx,
                        target: handler.target,
                    });
                }
            }
        }
        if (region.in_try(pc) || region.in_catch(pc))
            && let Some(finally) = region.finally
        {
            return Some(Landing::Finally {
                region: idx,
                target: finally,
            });
        }
        if region.in_finally(pc)
            && let Some(slot) = frame.completions.get_mut(idx)
        {
            // The new exception supersedes whatever the finally body was finishing.
            if let Some(Completion::Throw(old)) = slot.take() {
                chain_previous(exc, old, previous);
            }
        }
    }
    None
}

fn chain_previous(exc: &ObjectRef, old: ObjectRef, previous: Symbol) {
    if exc.ptr_eq(&old) {
        return;
    }
    let mut tail = exc.clone();
    while let Some(Val::Object(next)) = tail.property(previous) {
        if next.ptr_eq(&old) {
            return;
        }
        tail = next;
    }
    tail.set_property(previous, Val::Object(old));
}

impl VM {
    /// Propagates `exc` from the current instruction. Returns once a
    /// handler in a frame above `base` takes it; otherwise the base frame
    /// is popped and the exception is returned.
    pub(crate) fn unwind(&mut self, exc: ObjectRef, base: usize) -> Result<(), VmError> {
        let previous = self.program.sym.previous;
        loop {
            let Some(frame) = self.frames.last_mut() else {
                return Err(VmError::Thrown(exc));
            };
            if let Some(landing) = find_landing(frame, &exc, previous) {
                match landing {
                    Landing::Catch { region, target } => {
                        let depth = frame.chunk.try_regions[region].iter_depth as usize;
                        frame.stack.clear();
                        frame.calls.clear();
                        frame.iterators.truncate(depth);
                        frame.stack.push(Val::Object(exc));
                        frame.ip = target as usize;
                    }
                    Landing::Finally { region, target } => {
                        let depth = frame.chunk.try_regions[region].iter_depth as usize;
                        frame.stack.clear();
                        frame.calls.clear();
                        frame.iterators.truncate(depth);
                        frame.completions[region] = Some(Completion::Throw(exc));
                        frame.ip = target as usize;
                    }
                }
                return Ok(());
            }
            let popped = self.frames.pop();
            if let Some(frame) = popped {
                trace!(function = %self.sym_text(frame.func.name), "frame unwound");
                if let Some(generator) = &frame.generator {
                    self.finish_generator(generator, None);
                }
            }
            if self.frames.len() <= base {
                return Err(VmError::Thrown(exc));
            }
        }
    }

    /// `JmpFinally`: a `break`/`continue` leaving try blocks.
    pub(crate) fn jump_through_finally(&mut self, target: u32) -> Result<(), VmError> {
        let frame = self.frame_mut()?;
        let pc = frame.pc();
        let chunk = frame.chunk.clone();
        for (idx, region) in chunk.try_regions.iter().enumerate().rev() {
            if region.in_finally(pc) && !region.contains(target) {
                frame.completions[idx] = None;
                continue;
            }
            if (region.in_try(pc) || region.in_catch(pc)) && !region.contains(target) {
                if let Some(finally) = region.finally {
                    frame.completions[idx] = Some(Completion::Jump(target));
                    frame.ip = finally as usize;
                    return Ok(());
                }
            }
        }
        frame.ip = target as usize;
        Ok(())
    }

    /// `FinallyEnd(region)`: resumes the exit recorded when the finally body started.
    pub(crate) fn finally_end(&mut self, region: u32, base: usize) -> Result<Option<Val>, VmError> {
        let frame = self.frame_mut()?;
        let completion = frame.completions.get_mut(region as usize).and_then(Option::take);
        match completion {
            None => Ok(None),
            Some(Completion::Throw(exc)) => Err(VmError::Thrown(exc)),
            Some(Completion::Return(val)) => self.do_return(val, base),
            Some(Completion::Jump(target)) => {
                self.jump_through_finally(target)?;
                Ok(None)
            }
        }
    }

    /// `Return`: runs pending finally bodies, checks the declared return
    /// type and pops the frame. Returns the value when the base frame of
    /// the current run returned.
    pub(crate) fn do_return(&mut self, val: Val, base: usize) -> Result<Option<Val>, VmError> {
        {
            let frame = self.frame_mut()?;
            let pc = frame.pc();
            let chunk = frame.chunk.clone();
            for (idx, region) in chunk.try_regions.iter().enumerate().rev() {
                if region.in_finally(pc) {
                    frame.completions[idx] = None;
                    continue;
                }
                if (region.in_try(pc) || region.in_catch(pc))
                    && let Some(finally) = region.finally
                {
                    frame.completions[idx] = Some(Completion::Return(val));
                    frame.ip = finally as usize;
                    return Ok(None);
                }
            }
        }

        let val = self.check_return_type(val)?;
        let frame = self
            .frames
            .pop()
            .ok_or_else(|| VmError::Fatal("Return without a frame".into()))?;
        trace!(function = %self.sym_text(frame.func.name), "frame pop");
        if let Some(generator) = &frame.generator {
            self.finish_generator(generator, Some(val));
            return Ok(Some(Val::Null));
        }
        let discard = frame.discard;
        drop(frame);
        if self.frames.len() <= base {
            return Ok(Some(val));
        }
        if !discard {
            self.push(val)?;
        }
        Ok(None)
    }

    fn check_return_type(&mut self, val: Val) -> Result<Val, VmError> {
        let frame = self.frame()?;
        if frame.generator.is_some() {
            return Ok(val);
        }
        let Some(hint) = frame.func.return_type.clone() else {
            return Ok(val);
        };
        let func_name = self.sym_text(frame.func.name);
        let strict = self.force_strict_types || frame.chunk.strict_types;
        let scope = TypeScope {
            scope: frame.scope.clone(),
            static_class: frame.static_class.clone(),
        };
        if matches!(hint, crate::compiler::chunk::TypeHint::Void) {
            return Ok(Val::Null);
        }
        if matches!(hint, crate::compiler::chunk::TypeHint::Never) {
            return Err(self.type_error(format!(
                "{}(): never-returning function must not implicitly return",
                func_name
            )));
        }
        match self.coerce_to_type(val.clone(), &hint, strict, &scope)? {
            Some(coerced) => Ok(coerced),
            None => {
                let expected = self.type_hint_display(&hint);
                let given = self.debug_type(&val);
                Err(self.type_error(format!(
                    "{}(): Return value must be of type {}, {} returned",
                    func_name, expected, given
                )))
            }
        }
    }
}
