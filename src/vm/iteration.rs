//! foreach
//!
//! `IterInit` pushes an [`IterState`] on the frame's iterator stack and
//! `IterFree` pops it, so loops nest and `break` cleans up after itself.
//!
//! ## Semantics
//!
//! - By-value loops over an array walk a snapshot: the array handle taken
//!   at loop start, unaffected by writes to the variable.
//! - By-reference loops walk the array held in the variable itself and
//!   turn each element into a reference binding before handing it out.
//! - Plain objects yield their properties visible from the calling scope.
//! - `Iterator` objects are driven through `rewind`, `valid`, `current`,
//!   `key` and `next`; `IteratorAggregate::getIterator()` is followed until
//!   it produces one.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_vm_def.h` - ZEND_FE_RESET_R, ZEND_FE_FETCH_R, ZEND_FE_FETCH_RW
//! - Zend: `$PHP_SRC_PATH/Zend/zend_interfaces.c` - zend_user_it_get_new_iterator

use crate::core::value::{ArrayKey, ObjectRef, Reference, Symbol, Val};
use crate::vm::engine::{VM, VmError};
use crate::vm::frame::IterState;
use std::rc::Rc;

impl VM {
    /// Properties of `obj` visible from the executing scope, in declaration order.
    pub(crate) fn visible_properties(&self, obj: &ObjectRef) -> Vec<Symbol> {
        let scope = self.current_scope();
        let data = obj.borrow();
        data.properties
            .iter()
            .filter(|(_, val)| !matches!(val, Val::Uninitialized))
            .filter(|(name, _)| match obj.class().properties.get(*name) {
                Some(info) => self.is_visible_from(info.declaring_class, info.visibility, scope.as_deref()),
                None => true,
            })
            .map(|(name, _)| *name)
            .collect()
    }

    /// Follows `getIterator()` until an `Iterator` comes out.
    pub(crate) fn resolve_iterator(&mut self, obj: &ObjectRef) -> Result<ObjectRef, VmError> {
        let mut current = obj.clone();
        loop {
            if current.class().is_a(self.program.sym.iterator) {
                return Ok(current);
            }
            if !current.class().is_a(self.program.sym.iterator_aggregate) {
                let msg = format!("Object of type {} is not traversable", self.class_name(current.class()));
                return Err(self.throw_error(b"Error", msg));
            }
            let next = self.call_method(&current, b"getIterator", Vec::new())?.into_deref();
            match next {
                Val::Object(inner) if inner.class().is_a(self.program.sym.traversable) => current = inner,
                _ => {
                    let msg = format!(
                        "Objects returned by {}::getIterator() must be traversable or implement interface Iterator",
                        self.class_name(current.class())
                    );
                    return Err(self.throw_error(b"Exception", msg));
                }
            }
        }
    }

    /// Rewinds an iterator object. Returns its loop state and whether it
    /// has a first element.
    pub(crate) fn start_iterator(&mut self, obj: ObjectRef) -> Result<(IterState, bool), VmError> {
        if obj.class().lname == self.program.sym.generator {
            self.generator_rewind(&obj)?;
            let valid = self.generator_valid(&obj)?;
            return Ok((IterState::Generator { obj }, valid));
        }
        self.call_method(&obj, b"rewind", Vec::new())?;
        let valid = self.call_method(&obj, b"valid", Vec::new())?.to_bool();
        Ok((IterState::Iterator { obj }, valid))
    }

    /// `IterInit`: starts a foreach loop, or jumps to `end` when there is
    /// nothing to iterate.
    pub(crate) fn iter_init(&mut self, subject: Val, end: u32, by_ref: bool) -> Result<(), VmError> {
        let (cell, value) = match subject {
            Val::Ref(cell) if by_ref => {
                let value = cell.get();
                (Some(cell), value)
            }
            other => (None, other.into_deref()),
        };
        let started = match value {
            Val::Array(array) => {
                if array.is_empty() {
                    None
                } else {
                    Some(match cell {
                        Some(cell) => IterState::ArrayRef { cell, pos: 0 },
                        None => IterState::Array { array, pos: 0 },
                    })
                }
            }
            Val::Object(obj) if obj.class().is_a(self.program.sym.traversable) => {
                if by_ref {
                    let msg = if obj.class().lname == self.program.sym.generator {
                        "You can only iterate a generator by-reference if it declared that it yields by-reference"
                    } else {
                        "An iterator cannot be used with foreach by reference"
                    };
                    return Err(self.throw_error(b"Error", msg));
                }
                if obj.class().lname == self.program.sym.generator
                    && !self.generator_valid(&obj)?
                {
                    return Err(self.throw_error(b"Exception", "Cannot traverse an already closed generator"));
                }
                let iter = self.resolve_iterator(&obj)?;
                let (state, valid) = self.start_iterator(iter)?;
                valid.then_some(state)
            }
            Val::Object(obj) => {
                let keys = self.visible_properties(&obj);
                (!keys.is_empty()).then_some(IterState::Object {
                    obj,
                    keys,
                    pos: 0,
                    by_ref,
                })
            }
            // foreach over null or a scalar does nothing
            _ => None,
        };
        let frame = self.frame_mut()?;
        match started {
            Some(state) => frame.iterators.push(state),
            None => frame.ip = end as usize,
        }
        Ok(())
    }

    fn top_iterator(&mut self) -> Result<&mut IterState, VmError> {
        self.frame_mut()?
            .iterators
            .last_mut()
            .ok_or_else(|| VmError::Fatal("No active iterator".into()))
    }

    /// `IterKey`
    pub(crate) fn iter_key(&mut self) -> Result<Val, VmError> {
        let object = match self.top_iterator()? {
            IterState::Array { array, pos } => {
                return Ok(array.map.get_index(*pos).map(|(k, _)| k.to_val()).unwrap_or_default());
            }
            IterState::ArrayRef { cell, pos } => {
                let key = match &*cell.borrow() {
                    Val::Array(array) => array.map.get_index(*pos).map(|(k, _)| k.to_val()),
                    _ => None,
                };
                return Ok(key.unwrap_or_default());
            }
            IterState::Object { keys, pos, .. } => {
                let key = keys.get(*pos).copied();
                return Ok(match key {
                    Some(sym) => {
                        let text = self.program.interner.text(sym);
                        ArrayKey::from_bytes(text).to_val()
                    }
                    None => Val::Null,
                });
            }
            IterState::Iterator { obj } => Err(obj.clone()),
            IterState::Generator { obj } => Ok(obj.clone()),
        };
        match object {
            Ok(generator) => self.generator_key(&generator),
            Err(iterator) => Ok(self.call_method(&iterator, b"key", Vec::new())?.into_deref()),
        }
    }

    /// `IterValue`: the current element; a `Val::Ref` in by-reference loops.
    pub(crate) fn iter_value(&mut self) -> Result<Val, VmError> {
        let object = match self.top_iterator()? {
            IterState::Array { array, pos } => {
                return Ok(array.map.get_index(*pos).map(|(_, v)| v.deref_clone()).unwrap_or_default());
            }
            IterState::ArrayRef { cell, pos } => {
                let pos = *pos;
                let mut slot_holder = cell.borrow_mut();
                let Val::Array(array) = &mut *slot_holder else {
                    return Ok(Val::Null);
                };
                let array = Rc::make_mut(array);
                let Some((_, slot)) = array.map.get_index_mut(pos) else {
                    return Ok(Val::Null);
                };
                if let Val::Ref(existing) = slot {
                    return Ok(Val::Ref(existing.clone()));
                }
                let binding = Reference::new(std::mem::take(slot));
                *slot = Val::Ref(binding.clone());
                return Ok(Val::Ref(binding));
            }
            IterState::Object { obj, keys, pos, by_ref } => {
                let Some(name) = keys.get(*pos).copied() else {
                    return Ok(Val::Null);
                };
                if !*by_ref {
                    return Ok(obj.property(name).unwrap_or_default());
                }
                let mut data = obj.borrow_mut();
                let slot = data.properties.entry(name).or_insert(Val::Null);
                if let Val::Ref(existing) = slot {
                    return Ok(Val::Ref(existing.clone()));
                }
                let binding = Reference::new(std::mem::take(slot));
                *slot = Val::Ref(binding.clone());
                return Ok(Val::Ref(binding));
            }
            IterState::Iterator { obj } => Err(obj.clone()),
            IterState::Generator { obj } => Ok(obj.clone()),
        };
        match object {
            Ok(generator) => self.generator_current(&generator),
            Err(iterator) => Ok(self.call_method(&iterator, b"current", Vec::new())?.into_deref()),
        }
    }

    /// Moves the innermost iterator forward; returns whether it still has
    /// an element.
    pub(crate) fn iter_advance(&mut self) -> Result<bool, VmError> {
        let object = match self.top_iterator()? {
            IterState::Array { array, pos } => {
                *pos += 1;
                return Ok(*pos < array.len());
            }
            IterState::ArrayRef { cell, pos } => {
                *pos += 1;
                let len = match &*cell.borrow() {
                    Val::Array(array) => array.len(),
                    _ => 0,
                };
                return Ok(*pos < len);
            }
            IterState::Object { obj, keys, pos, .. } => {
                *pos += 1;
                // Skip properties unset during the loop
                while let Some(name) = keys.get(*pos) {
                    let present = obj
                        .borrow()
                        .properties
                        .get(name)
                        .is_some_and(|v| !matches!(v, Val::Uninitialized));
                    if present {
                        break;
                    }
                    *pos += 1;
                }
                return Ok(*pos < keys.len());
            }
            IterState::Iterator { obj } => Err(obj.clone()),
            IterState::Generator { obj } => Ok(obj.clone()),
        };
        match object {
            Ok(generator) => {
                self.generator_next(&generator)?;
                self.generator_valid(&generator)
            }
            Err(iterator) => {
                self.call_method(&iterator, b"next", Vec::new())?;
                Ok(self.call_method(&iterator, b"valid", Vec::new())?.to_bool())
            }
        }
    }

    /// `IterNext`: advances and jumps back to the loop body at `target`.
    pub(crate) fn iter_next(&mut self, target: u32) -> Result<(), VmError> {
        if self.iter_advance()? {
            self.frame_mut()?.ip = target as usize;
        }
        Ok(())
    }

    /// Every key/value pair of a Traversable or plain object, for argument
    /// unpacking, array spreading and `iterator_to_array`.
    pub(crate) fn iterate_object(&mut self, obj: &ObjectRef) -> Result<Vec<(Val, Val)>, VmError> {
        if !obj.class().is_a(self.program.sym.traversable) {
            let pairs = self
                .visible_properties(obj)
                .into_iter()
                .map(|name| {
                    let key = ArrayKey::from_bytes(self.program.interner.text(name)).to_val();
                    (key, obj.property(name).unwrap_or_default())
                })
                .collect();
            return Ok(pairs);
        }
        let iter = self.resolve_iterator(obj)?;
        let mut pairs = Vec::new();
        if iter.class().lname == self.program.sym.generator {
            self.generator_rewind(&iter)?;
            while self.generator_valid(&iter)? {
                let key = self.generator_key(&iter)?;
                let value = self.generator_current(&iter)?;
                pairs.push((key, value));
                self.generator_next(&iter)?;
            }
            return Ok(pairs);
        }
        self.call_method(&iter, b"rewind", Vec::new())?;
        while self.call_method(&iter, b"valid", Vec::new())?.to_bool() {
            let value = self.call_method(&iter, b"current", Vec::new())?.into_deref();
            let key = self.call_method(&iter, b"key", Vec::new())?.into_deref();
            pairs.push((key, value));
            self.call_method(&iter, b"next", Vec::new())?;
        }
        Ok(pairs)
    }
}
