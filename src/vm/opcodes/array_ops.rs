//! Array literal construction
//!
//! Implements the opcodes that build array literals, following Zend semantics.
//!
//! ## PHP Semantics
//!
//! PHP arrays are ordered hash maps supporting both integer and string keys:
//! - Automatic integer key assignment for append operations
//! - Numeric string keys ("0", "123") are stored as integers
//! - `&$x` items store a reference binding shared with the variable
//! - Spreading (`[...$a]`) renumbers integer keys and overwrites string keys
//!
//! ## Operations
//!
//! - **NewArray**: Create a new array with initial capacity
//! - **ArrayPush**: `[$v]` - Append with auto-key
//! - **ArrayInsert**: `[$k => $v]` - Insert at key
//! - **ArraySpread**: `[...$iterable]` - Unpack an array or Traversable
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_vm_def.h` - ZEND_INIT_ARRAY, ZEND_ADD_ARRAY_ELEMENT, ZEND_ADD_ARRAY_UNPACK
//! - Zend: `$PHP_SRC_PATH/Zend/zend_hash.c` - Hash table implementation

use crate::core::value::{ArrayData, ArrayKey, Val};
use crate::vm::engine::{VM, VmError};
use std::rc::Rc;

impl VM {
    /// Array key for an offset value.
    /// Reference: $PHP_SRC_PATH/Zend/zend_execute.c - zend_fetch_dimension_address_inner
    pub(crate) fn to_array_key(&mut self, key: &Val) -> Result<ArrayKey, VmError> {
        Ok(match key {
            Val::Int(i) => ArrayKey::Int(*i),
            Val::String(s) => ArrayKey::from_bytes(s),
            Val::Bool(b) => ArrayKey::Int(i64::from(*b)),
            Val::Float(f) => ArrayKey::Int(crate::core::value::float_to_int(*f)),
            Val::Null | Val::Uninitialized => ArrayKey::Str(Rc::new(Vec::new())),
            Val::Resource(r) => ArrayKey::Int(i64::from(r.id)),
            Val::Ref(r) => {
                let inner = r.get();
                return self.to_array_key(&inner);
            }
            other => {
                let ty = self.debug_type(other);
                return Err(self.type_error(format!("Illegal offset type {}", ty)));
            }
        })
    }

    fn array_on_top(&mut self) -> Result<&mut ArrayData, VmError> {
        match self.frame_mut()?.stack.last_mut() {
            Some(Val::Array(arr)) => Ok(Rc::make_mut(arr)),
            _ => Err(VmError::Fatal("Array literal expected on the stack".into())),
        }
    }

    pub(crate) fn op_array_push(&mut self) -> Result<(), VmError> {
        let val = self.pop()?;
        let arr = self.array_on_top()?;
        let occupied = arr.next_index() == i64::MAX && arr.contains_key(&ArrayKey::Int(i64::MAX));
        if occupied {
            return Err(self.throw_error(
                b"Error",
                "Cannot add element to the array as the next element is already occupied",
            ));
        }
        self.array_on_top()?.push(val);
        Ok(())
    }

    pub(crate) fn op_array_insert(&mut self) -> Result<(), VmError> {
        let val = self.pop()?;
        let key = self.pop()?;
        let key = self.to_array_key(&key)?;
        let arr = self.array_on_top()?;
        arr.insert_raw(key, val);
        Ok(())
    }

    pub(crate) fn op_array_spread(&mut self) -> Result<(), VmError> {
        let source = self.pop()?.into_deref();
        let pairs: Vec<(Val, Val)> = match &source {
            Val::Array(src) => src.map.iter().map(|(k, v)| (k.to_val(), v.deref_clone())).collect(),
            Val::Object(obj) if obj.class().is_a(self.program.sym.traversable) => self.iterate_object(obj)?,
            other => {
                let ty = self.debug_type(other);
                return Err(self.throw_error(b"Error", format!("Only arrays and Traversables can be unpacked, {} given", ty)));
            }
        };
        for (key, value) in pairs {
            match key {
                Val::String(s) => {
                    let arr = self.array_on_top()?;
                    arr.insert_raw(ArrayKey::Str(s), value);
                }
                _ => {
                    let arr = self.array_on_top()?;
                    arr.push(value);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::Program;

    #[test]
    fn test_offset_keys_are_normalized() {
        let mut vm = VM::new(Program::new());
        assert!(matches!(vm.to_array_key(&Val::string("12")), Ok(ArrayKey::Int(12))));
        assert!(matches!(vm.to_array_key(&Val::string("012")), Ok(ArrayKey::Str(_))));
        assert!(matches!(vm.to_array_key(&Val::Float(3.9)), Ok(ArrayKey::Int(3))));
        assert!(matches!(vm.to_array_key(&Val::Bool(true)), Ok(ArrayKey::Int(1))));
        assert!(vm.to_array_key(&Val::empty_array()).is_err());
    }
}
