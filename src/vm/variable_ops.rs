//! Variables and lvalues
//!
//! Every write instruction names a [`Place`]: a local slot, a property or a
//! static property, followed by `depth` array dimensions whose keys sit on
//! the operand stack. A write walks the dimensions, creating arrays where
//! the container is null, and applies one [`WriteOp`] at the end.
//!
//! Containers are moved out of their slot while they are modified and put
//! back afterwards, so an array owned by a single variable is updated in
//! place instead of being copied.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_execute.c` - zend_fetch_dimension_address_W, zend_assign_to_variable
//! - Zend: `$PHP_SRC_PATH/Zend/zend_vm_def.h` - ZEND_ASSIGN_DIM, ZEND_ASSIGN_REF, ZEND_UNSET_DIM

use crate::core::value::{ArrayKey, ObjectRef, Reference, Symbol, Val};
use crate::vm::engine::{VM, VmError};
use crate::vm::opcode::{ArithOp, ClassRef, IncDecKind, Place};
use crate::vm::type_conversion::TypeScope;
use std::rc::Rc;

/// What a write instruction does to its place.
pub(crate) enum WriteOp {
    Assign(Val),
    AssignRef(Reference),
    Compound(ArithOp, Val),
    IncDec(IncDecKind),
    /// Turn the place into a reference binding and return it
    MakeRef,
    Unset,
}

/// Resolved base of a place.
enum Base {
    Local(u32),
    Static(Reference),
    Prop(ObjectRef, Symbol),
}

impl VM {
    /// Pops the prefix of a place (object, property name, class) once the
    /// dimension keys are off the stack.
    fn place_base(&mut self, place: Place) -> Result<Base, VmError> {
        Ok(match place {
            Place::Local(slot) => Base::Local(slot),
            Place::Prop(name) => {
                let target = self.pop()?.into_deref();
                Base::Prop(self.write_target(target, name)?, name)
            }
            Place::PropDynamic => {
                let name = self.pop()?.into_deref();
                let target = self.pop()?.into_deref();
                let name = self.property_name(&name)?;
                Base::Prop(self.write_target(target, name)?, name)
            }
            Place::StaticProp(class, name) => {
                let class = self.resolve_class_ref(class)?;
                Base::Static(self.static_prop_cell(&class, name)?)
            }
        })
    }

    fn write_target(&mut self, target: Val, name: Symbol) -> Result<ObjectRef, VmError> {
        match target {
            Val::Object(obj) => Ok(obj),
            other => {
                let msg = format!(
                    "Attempt to assign property \"{}\" on {}",
                    self.sym_text(name),
                    other.type_name()
                );
                Err(self.throw_error(b"Error", msg))
            }
        }
    }

    fn local_cell(&self, slot: u32) -> Result<Reference, VmError> {
        self.frame()?
            .locals
            .get(slot as usize)
            .cloned()
            .ok_or_else(|| VmError::Fatal("Local slot out of range".into()))
    }

    /// Rebinds a local slot; in the main script the global table follows.
    fn rebind_local(&mut self, slot: u32, cell: Reference) -> Result<(), VmError> {
        let frame = self.frame_mut()?;
        let name = if frame.is_main {
            frame.chunk.local_names.get(slot as usize).copied().flatten()
        } else {
            None
        };
        let old = frame
            .locals
            .get_mut(slot as usize)
            .map(|local| std::mem::replace(local, cell.clone()));
        if let Some(name) = name {
            self.globals.insert(name, cell);
        }
        drop(old);
        Ok(())
    }

    /// Applies `op` to the place described by `place` and `depth`.
    pub(crate) fn write_place(&mut self, place: Place, depth: u8, op: WriteOp) -> Result<Val, VmError> {
        let keys = self.pop_n(depth as usize)?;
        let base = self.place_base(place)?;
        if keys.is_empty() {
            return self.write_base(base, op);
        }
        match base {
            Base::Local(slot) => {
                let cell = self.local_cell(slot)?;
                self.write_cell_dims(&cell, &keys, op)
            }
            Base::Static(cell) => self.write_cell_dims(&cell, &keys, op),
            Base::Prop(obj, name) => {
                if self.property_storage(&obj, name)?.is_none() {
                    // Served by __get or a hook: only object handles propagate.
                    let mut value = self.read_object_prop(&obj, name, false)?;
                    return self.write_dims(&mut value, &keys, op);
                }
                let mut container = obj
                    .borrow_mut()
                    .properties
                    .get_mut(&name)
                    .map(std::mem::take)
                    .unwrap_or(Val::Null);
                if matches!(container, Val::Uninitialized) {
                    container = Val::Null;
                }
                let result = self.write_dims(&mut container, &keys, op);
                let old = obj.borrow_mut().properties.insert(name, container);
                drop(old);
                result
            }
        }
    }

    fn write_cell_dims(&mut self, cell: &Reference, keys: &[Val], op: WriteOp) -> Result<Val, VmError> {
        let mut container = cell.take();
        if matches!(container, Val::Uninitialized) {
            container = Val::Null;
        }
        let result = self.write_dims(&mut container, keys, op);
        let old = std::mem::replace(&mut *cell.borrow_mut(), container);
        drop(old);
        result
    }

    fn write_base(&mut self, base: Base, op: WriteOp) -> Result<Val, VmError> {
        match base {
            Base::Local(slot) => {
                let cell = self.local_cell(slot)?;
                match op {
                    WriteOp::AssignRef(target) => {
                        let value = target.get();
                        self.rebind_local(slot, target)?;
                        Ok(value)
                    }
                    WriteOp::Unset => {
                        self.rebind_local(slot, Reference::new(Val::Uninitialized))?;
                        Ok(Val::Null)
                    }
                    op => self.write_cell(&cell, op),
                }
            }
            Base::Static(cell) => match op {
                WriteOp::Unset => Err(self.throw_error(b"Error", "Attempt to unset static property")),
                WriteOp::AssignRef(target) => {
                    let value = target.get();
                    cell.set(value.clone());
                    Ok(value)
                }
                op => self.write_cell(&cell, op),
            },
            Base::Prop(obj, name) => self.write_prop_op(&obj, name, op),
        }
    }

    /// Applies a value operation to a variable cell.
    fn write_cell(&mut self, cell: &Reference, op: WriteOp) -> Result<Val, VmError> {
        match op {
            WriteOp::Assign(val) => {
                let old = std::mem::replace(&mut *cell.borrow_mut(), val.clone());
                drop(old);
                Ok(val)
            }
            WriteOp::Compound(op, rhs) => {
                let current = self.defined(cell.get());
                let result = self.arith(op, &current, &rhs)?;
                cell.set(result.clone());
                Ok(result)
            }
            WriteOp::IncDec(kind) => {
                let current = self.defined(cell.get());
                let (result, updated) = self.inc_dec_value(kind, current)?;
                cell.set(updated);
                Ok(result)
            }
            WriteOp::MakeRef => {
                if matches!(*cell.borrow(), Val::Uninitialized) {
                    cell.set(Val::Null);
                }
                Ok(Val::Ref(cell.clone()))
            }
            WriteOp::AssignRef(_) | WriteOp::Unset => Err(VmError::Fatal("Invalid cell operation".into())),
        }
    }

    fn defined(&self, val: Val) -> Val {
        match val {
            Val::Uninitialized => Val::Null,
            other => other,
        }
    }

    fn write_prop_op(&mut self, obj: &ObjectRef, name: Symbol, op: WriteOp) -> Result<Val, VmError> {
        match op {
            WriteOp::Assign(val) => {
                self.write_prop(obj, name, val.clone())?;
                // Typed properties report the coerced value
                let typed = obj.class().properties.get(&name).is_some_and(|p| p.type_hint.is_some());
                if typed && let Some(stored) = obj.property(name) {
                    return Ok(stored);
                }
                Ok(val)
            }
            WriteOp::Compound(op, rhs) => {
                let current = self.read_object_prop(obj, name, false)?;
                let result = self.arith(op, &current, &rhs)?;
                self.write_prop(obj, name, result.clone())?;
                Ok(result)
            }
            WriteOp::IncDec(kind) => {
                let current = self.read_object_prop(obj, name, false)?;
                let (result, updated) = self.inc_dec_value(kind, current)?;
                self.write_prop(obj, name, updated)?;
                Ok(result)
            }
            WriteOp::MakeRef => {
                if self.property_storage(obj, name)?.is_none() {
                    let value = self.read_object_prop(obj, name, false)?;
                    return Ok(Val::Ref(Reference::new(value)));
                }
                let mut data = obj.borrow_mut();
                let slot = data.properties.entry(name).or_insert(Val::Null);
                if let Val::Ref(cell) = slot {
                    return Ok(Val::Ref(cell.clone()));
                }
                let value = match std::mem::take(slot) {
                    Val::Uninitialized => Val::Null,
                    other => other,
                };
                let cell = Reference::new(value);
                *slot = Val::Ref(cell.clone());
                Ok(Val::Ref(cell))
            }
            WriteOp::AssignRef(cell) => {
                if self.property_storage(obj, name)?.is_none() {
                    let value = cell.get();
                    self.write_prop(obj, name, value.clone())?;
                    return Ok(value);
                }
                let value = cell.get();
                let old = obj.borrow_mut().properties.insert(name, Val::Ref(cell));
                drop(old);
                Ok(value)
            }
            WriteOp::Unset => {
                self.unset_prop(obj, name)?;
                Ok(Val::Null)
            }
        }
    }

    /// Walks the dimensions `keys` below `container` and applies `op` to the
    /// last one.
    fn write_dims(&mut self, container: &mut Val, keys: &[Val], op: WriteOp) -> Result<Val, VmError> {
        let Some((key, rest)) = keys.split_first() else {
            return Err(VmError::Fatal("Dimension write without keys".into()));
        };
        if let Val::Ref(cell) = container {
            let cell = cell.clone();
            let mut inner = cell.take();
            let result = self.write_dims(&mut inner, keys, op);
            let old = std::mem::replace(&mut *cell.borrow_mut(), inner);
            drop(old);
            return result;
        }
        match container {
            Val::Null | Val::Uninitialized | Val::Bool(false) => {
                if matches!(op, WriteOp::Unset) {
                    return Ok(Val::Null);
                }
                *container = Val::empty_array();
                self.write_dims(container, keys, op)
            }
            Val::Array(arr) => {
                let key = match key {
                    Val::AppendPlaceholder => None,
                    other => Some(self.to_array_key(other)?),
                };
                let arr = Rc::make_mut(arr);
                if rest.is_empty() {
                    return self.write_element(arr, key, op);
                }
                let key = match key {
                    Some(key) => key,
                    None => {
                        if matches!(op, WriteOp::Unset) {
                            return Err(self.throw_error(b"Error", "Cannot use [] for unsetting"));
                        }
                        self.append_slot(arr)?
                    }
                };
                let mut child = match arr.map.get_mut(&key) {
                    Some(slot) => std::mem::take(slot),
                    None if matches!(op, WriteOp::Unset) => return Ok(Val::Null),
                    None => Val::Null,
                };
                let result = self.write_dims(&mut child, rest, op);
                arr.insert_raw(key, child);
                result
            }
            Val::Object(obj) => {
                let obj = obj.clone();
                self.write_object_dim(&obj, key, rest, op)
            }
            Val::String(s) => {
                if !rest.is_empty() {
                    return Err(self.throw_error(b"Error", "Cannot use string offset as an array"));
                }
                match op {
                    WriteOp::Assign(val) => {
                        let s = Rc::make_mut(s);
                        let written = self.write_string_offset(s, key, &val)?;
                        Ok(written)
                    }
                    WriteOp::Unset => Err(self.throw_error(b"Error", "Cannot unset string offsets")),
                    WriteOp::MakeRef | WriteOp::AssignRef(_) => {
                        Err(self.throw_error(b"Error", "Cannot create references to/from string offsets"))
                    }
                    WriteOp::Compound(..) | WriteOp::IncDec(_) => Err(self.throw_error(
                        b"Error",
                        "Cannot use assign-op operators with string offsets",
                    )),
                }
            }
            _ => {
                if matches!(op, WriteOp::Unset) {
                    return Err(self.throw_error(b"Error", "Cannot unset offset in a non-array variable"));
                }
                Err(self.throw_error(b"Error", "Cannot use a scalar value as an array"))
            }
        }
    }

    fn append_slot(&mut self, arr: &mut crate::core::value::ArrayData) -> Result<ArrayKey, VmError> {
        if arr.next_index() == i64::MAX && arr.contains_key(&ArrayKey::Int(i64::MAX)) {
            return Err(self.throw_error(
                b"Error",
                "Cannot add element to the array as the next element is already occupied",
            ));
        }
        Ok(arr.push(Val::Null))
    }

    fn write_element(
        &mut self,
        arr: &mut crate::core::value::ArrayData,
        key: Option<ArrayKey>,
        op: WriteOp,
    ) -> Result<Val, VmError> {
        if let WriteOp::Unset = op {
            if let Some(key) = key {
                let old = arr.remove(&key);
                drop(old);
                return Ok(Val::Null);
            }
            return Err(self.throw_error(b"Error", "Cannot use [] for unsetting"));
        }
        let key = match key {
            Some(key) => key,
            None => self.append_slot(arr)?,
        };
        match op {
            WriteOp::Assign(val) => {
                arr.insert(key, val.clone());
                Ok(val)
            }
            WriteOp::AssignRef(cell) => {
                let value = cell.get();
                arr.insert_raw(key, Val::Ref(cell));
                Ok(value)
            }
            WriteOp::Compound(op, rhs) => {
                let current = arr.get(&key).unwrap_or_default();
                let result = self.arith(op, &current, &rhs)?;
                arr.insert(key, result.clone());
                Ok(result)
            }
            WriteOp::IncDec(kind) => {
                let current = arr.get(&key).unwrap_or_default();
                let (result, updated) = self.inc_dec_value(kind, current)?;
                arr.insert(key, updated);
                Ok(result)
            }
            WriteOp::MakeRef => {
                if let Some(Val::Ref(cell)) = arr.get_raw(&key) {
                    return Ok(Val::Ref(cell.clone()));
                }
                let value = arr.get(&key).unwrap_or_default();
                let cell = Reference::new(value);
                arr.insert_raw(key, Val::Ref(cell.clone()));
                Ok(Val::Ref(cell))
            }
            WriteOp::Unset => Ok(Val::Null),
        }
    }

    /// Dimension write on an `ArrayAccess` object.
    fn write_object_dim(&mut self, obj: &ObjectRef, key: &Val, rest: &[Val], op: WriteOp) -> Result<Val, VmError> {
        let offset = match key {
            Val::AppendPlaceholder => Val::Null,
            other => other.deref_clone(),
        };
        if !rest.is_empty() {
            let mut child = self.call_array_access_offset_get(obj, offset)?.into_deref();
            return self.write_dims(&mut child, rest, op);
        }
        match op {
            WriteOp::Assign(val) => {
                self.call_array_access_offset_set(obj, offset, val.clone())?;
                Ok(val)
            }
            WriteOp::AssignRef(cell) => {
                let val = cell.get();
                self.call_array_access_offset_set(obj, offset, val.clone())?;
                Ok(val)
            }
            WriteOp::Compound(op, rhs) => {
                let current = self.call_array_access_offset_get(obj, offset.clone())?.into_deref();
                let result = self.arith(op, &current, &rhs)?;
                self.call_array_access_offset_set(obj, offset, result.clone())?;
                Ok(result)
            }
            WriteOp::IncDec(kind) => {
                let current = self.call_array_access_offset_get(obj, offset.clone())?.into_deref();
                let (result, updated) = self.inc_dec_value(kind, current)?;
                self.call_array_access_offset_set(obj, offset, updated)?;
                Ok(result)
            }
            WriteOp::MakeRef => Ok(match self.call_array_access_offset_get(obj, offset)? {
                Val::Ref(cell) => Val::Ref(cell),
                other => Val::Ref(Reference::new(other)),
            }),
            WriteOp::Unset => {
                self.call_array_access_offset_unset(obj, offset)?;
                Ok(Val::Null)
            }
        }
    }

    /// `$str[$i] = $c`: replaces one byte, padding with spaces past the end.
    fn write_string_offset(&mut self, s: &mut Vec<u8>, key: &Val, val: &Val) -> Result<Val, VmError> {
        let offset = match key {
            Val::AppendPlaceholder => {
                return Err(self.throw_error(b"Error", "[] operator not supported for strings"));
            }
            Val::Int(i) => *i,
            other => match other.to_number() {
                Some(n) => n.into_val().to_int(),
                None => {
                    let msg = format!("Cannot access offset of type {} on string", self.debug_type(other));
                    return Err(self.type_error(msg));
                }
            },
        };
        let offset = if offset < 0 { s.len() as i64 + offset } else { offset };
        if offset < 0 {
            return Err(self.throw_error(b"Error", format!("Illegal string offset {}", offset)));
        }
        let bytes = self.to_string_bytes(val)?;
        let Some(byte) = bytes.first().copied() else {
            return Err(self.throw_error(b"Error", "Cannot assign an empty string to a string offset"));
        };
        let offset = offset as usize;
        if offset >= s.len() {
            s.resize(offset + 1, b' ');
        }
        s[offset] = byte;
        Ok(Val::string(vec![byte]))
    }

    // ---- instructions ------------------------------------------------------

    /// `Assign`: `[prefix.., keys.., Val] -> [Val]`
    pub(crate) fn op_assign(&mut self, place: Place, depth: u8) -> Result<(), VmError> {
        let val = self.pop()?.into_deref();
        let val = self.check_static_prop_type(place, val)?;
        let result = self.write_place(place, depth, WriteOp::Assign(val))?;
        self.push(result)
    }

    /// Typed static properties coerce assigned values like typed properties.
    fn check_static_prop_type(&mut self, place: Place, val: Val) -> Result<Val, VmError> {
        let Place::StaticProp(class_ref, name) = place else {
            return Ok(val);
        };
        if matches!(class_ref, ClassRef::Dynamic) {
            return Ok(val);
        }
        let class = self.resolve_class_ref(class_ref)?;
        let Some(info) = self.static_prop_info(&class, name) else {
            return Ok(val);
        };
        let Some(hint) = info.type_hint.clone() else {
            return Ok(val);
        };
        let scope = TypeScope {
            scope: self.program.class(info.declaring_class).cloned(),
            static_class: Some(class.clone()),
        };
        let strict = self.strict_types();
        match self.coerce_to_type(val.clone(), &hint, strict, &scope)? {
            Some(coerced) => Ok(coerced),
            None => {
                let msg = format!(
                    "Cannot assign {} to property {}::${} of type {}",
                    self.debug_type(&val),
                    self.class_name(&class),
                    self.sym_text(name),
                    self.type_hint_display(&hint)
                );
                Err(self.type_error(msg))
            }
        }
    }

    /// `AssignOp`: `$x += $y` and friends.
    pub(crate) fn op_assign_op(&mut self, place: Place, depth: u8, op: ArithOp) -> Result<(), VmError> {
        let rhs = self.pop()?.into_deref();
        let result = self.write_place(place, depth, WriteOp::Compound(op, rhs))?;
        self.push(result)
    }

    /// `IncDec`: `++$x`, `$x--`, ...
    pub(crate) fn op_inc_dec(&mut self, place: Place, depth: u8, kind: IncDecKind) -> Result<(), VmError> {
        let result = self.write_place(place, depth, WriteOp::IncDec(kind))?;
        self.push(result)
    }

    /// `AssignRef`: `[prefix.., keys.., Ref] -> [Val]`
    pub(crate) fn op_assign_ref(&mut self, place: Place, depth: u8) -> Result<(), VmError> {
        let cell = match self.pop()? {
            Val::Ref(cell) => cell,
            other => Reference::new(other),
        };
        let result = self.write_place(place, depth, WriteOp::AssignRef(cell))?;
        self.push(result)
    }

    /// `MakeRef`: the reference cell behind a place, creating it if needed.
    pub(crate) fn make_ref(&mut self, place: Place, depth: u8) -> Result<Reference, VmError> {
        match self.write_place(place, depth, WriteOp::MakeRef)? {
            Val::Ref(cell) => Ok(cell),
            other => Ok(Reference::new(other)),
        }
    }

    pub(crate) fn op_unset(&mut self, place: Place, depth: u8) -> Result<(), VmError> {
        self.write_place(place, depth, WriteOp::Unset)?;
        Ok(())
    }

    /// Current value of a place, for passing it by value.
    pub(crate) fn read_place(&mut self, place: Place, depth: u8) -> Result<Val, VmError> {
        let keys = self.pop_n(depth as usize)?;
        let mut value = match place {
            Place::Local(slot) => self.defined(self.local_cell(slot)?.get()),
            Place::Prop(name) => {
                let target = self.pop()?.into_deref();
                self.read_prop(&target, name, false)?
            }
            Place::PropDynamic => {
                let name = self.pop()?.into_deref();
                let target = self.pop()?.into_deref();
                let name = self.property_name(&name)?;
                self.read_prop(&target, name, false)?
            }
            Place::StaticProp(class, name) => {
                let class = self.resolve_class_ref(class)?;
                self.static_prop_cell(&class, name)?.get()
            }
        };
        for key in &keys {
            if matches!(key, Val::AppendPlaceholder) {
                return Err(self.throw_error(b"Error", "Cannot use [] for reading"));
            }
            value = self.fetch_dim(&value, key, false)?;
        }
        Ok(value)
    }

    /// `SendPlace`: passes a variable, by reference when the parameter wants one.
    pub(crate) fn send_place(&mut self, place: Place, depth: u8) -> Result<(), VmError> {
        if self.next_arg_by_ref()? {
            let cell = self.make_ref(place, depth)?;
            let call = self
                .frame_mut()?
                .calls
                .last_mut()
                .ok_or_else(|| VmError::Fatal("Argument without a call".into()))?;
            call.args.push(Val::Ref(cell));
            return Ok(());
        }
        let value = self.read_place(place, depth)?;
        self.send_val(value)
    }
}
