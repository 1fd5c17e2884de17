//! Reading array dimensions
//!
//! `$a[$k]` on arrays, strings and `ArrayAccess` objects, and the
//! `isset()`/`empty()` forms of it. Reading a missing element yields null;
//! reading through a scalar yields null as well.
//!
//! Reference: $PHP_SRC_PATH/Zend/zend_execute.c - zend_fetch_dimension_address_read_R, zend_isset_dim_slow

use crate::core::value::{ArrayKey, ObjectRef, Val};
use crate::vm::engine::{VM, VmError};

impl VM {
    fn require_array_access(&mut self, obj: &ObjectRef) -> Result<(), VmError> {
        if obj.class().is_a(self.program.sym.array_access) {
            return Ok(());
        }
        let msg = format!("Cannot use object of type {} as array", self.class_name(obj.class()));
        Err(self.throw_error(b"Error", msg))
    }

    /// Call ArrayAccess::offsetExists($offset)
    pub(crate) fn call_array_access_offset_exists(&mut self, obj: &ObjectRef, offset: Val) -> Result<bool, VmError> {
        self.require_array_access(obj)?;
        Ok(self.call_method(obj, b"offsetExists", vec![offset])?.to_bool())
    }

    /// Call ArrayAccess::offsetGet($offset)
    pub(crate) fn call_array_access_offset_get(&mut self, obj: &ObjectRef, offset: Val) -> Result<Val, VmError> {
        self.require_array_access(obj)?;
        self.call_method(obj, b"offsetGet", vec![offset])
    }

    /// Call ArrayAccess::offsetSet($offset, $value)
    pub(crate) fn call_array_access_offset_set(&mut self, obj: &ObjectRef, offset: Val, value: Val) -> Result<(), VmError> {
        self.require_array_access(obj)?;
        self.call_method(obj, b"offsetSet", vec![offset, value])?;
        Ok(())
    }

    /// Call ArrayAccess::offsetUnset($offset)
    pub(crate) fn call_array_access_offset_unset(&mut self, obj: &ObjectRef, offset: Val) -> Result<(), VmError> {
        self.require_array_access(obj)?;
        self.call_method(obj, b"offsetUnset", vec![offset])?;
        Ok(())
    }

    /// `FetchDim`: `$container[$key]`. `quiet` is set inside `??` and `isset`.
    pub(crate) fn fetch_dim(&mut self, container: &Val, key: &Val, quiet: bool) -> Result<Val, VmError> {
        if matches!(key, Val::AppendPlaceholder) {
            return Err(self.throw_error(b"Error", "Cannot use [] for reading"));
        }
        match container {
            Val::Ref(cell) => {
                let inner = cell.get();
                self.fetch_dim(&inner, key, quiet)
            }
            Val::Array(arr) => {
                let key = self.to_array_key(key)?;
                Ok(arr.get(&key).unwrap_or_default())
            }
            Val::String(s) => match self.string_offset(s, key, quiet)? {
                Some(byte) => Ok(Val::string(vec![byte])),
                None if quiet => Ok(Val::Null),
                None => Ok(Val::string(Vec::new())),
            },
            Val::Object(obj) => {
                let offset = key.deref_clone();
                Ok(self.call_array_access_offset_get(obj, offset)?.into_deref())
            }
            _ => Ok(Val::Null),
        }
    }

    /// Byte at a string offset; `None` when out of range. Non-numeric
    /// offsets throw unless `quiet`.
    fn string_offset(&mut self, s: &[u8], key: &Val, quiet: bool) -> Result<Option<u8>, VmError> {
        let offset = match key.deref_clone() {
            Val::Int(i) => i,
            Val::Bool(b) => i64::from(b),
            Val::Float(f) => crate::core::value::float_to_int(f),
            Val::Null => 0,
            Val::String(k) => match ArrayKey::from_bytes(&k) {
                ArrayKey::Int(i) => i,
                ArrayKey::Str(_) if quiet => return Ok(None),
                ArrayKey::Str(_) => {
                    return Err(self.type_error("Cannot access offset of type string on string"));
                }
            },
            other => {
                if quiet {
                    return Ok(None);
                }
                let ty = self.debug_type(&other);
                return Err(self.type_error(format!("Cannot access offset of type {} on string", ty)));
            }
        };
        let index = if offset < 0 { s.len() as i64 + offset } else { offset };
        if index < 0 {
            return Ok(None);
        }
        Ok(s.get(index as usize).copied())
    }

    /// `IssetDim`: `isset($c[$k])`, or `empty($c[$k])` when `empty` is set.
    pub(crate) fn isset_dim(&mut self, container: &Val, key: &Val, empty: bool) -> Result<bool, VmError> {
        let value = match container {
            Val::Ref(cell) => {
                let inner = cell.get();
                return self.isset_dim(&inner, key, empty);
            }
            Val::Array(arr) => {
                let Ok(key) = self.to_array_key(key) else {
                    return Ok(empty);
                };
                arr.get(&key)
            }
            Val::String(s) => {
                if matches!(key.deref_clone(), Val::String(ref k) if matches!(ArrayKey::from_bytes(k), ArrayKey::Str(_))) {
                    return Ok(empty);
                }
                self.string_offset(s, key, true)?.map(|b| Val::string(vec![b]))
            }
            Val::Object(obj) => {
                let offset = key.deref_clone();
                if !self.call_array_access_offset_exists(obj, offset.clone())? {
                    return Ok(empty);
                }
                if !empty {
                    return Ok(true);
                }
                Some(self.call_array_access_offset_get(obj, offset)?.into_deref())
            }
            _ => None,
        };
        Ok(match value {
            Some(val) if empty => !val.to_bool(),
            Some(val) => !val.is_null(),
            None => empty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::value::ArrayData;
    use crate::runtime::context::Program;
    use std::rc::Rc;

    fn vm() -> VM {
        VM::new(Program::new())
    }

    #[test]
    fn test_missing_elements_read_as_null() {
        let mut vm = vm();
        let arr = Val::Array(Rc::new(ArrayData::from(vec![Val::Int(1)])));
        assert!(matches!(vm.fetch_dim(&arr, &Val::Int(0), false), Ok(Val::Int(1))));
        assert!(matches!(vm.fetch_dim(&arr, &Val::Int(5), false), Ok(Val::Null)));
        assert!(matches!(vm.fetch_dim(&Val::Null, &Val::Int(0), false), Ok(Val::Null)));
    }

    #[test]
    fn test_string_offsets() {
        let mut vm = vm();
        let s = Val::string("abc");
        match vm.fetch_dim(&s, &Val::Int(-1), false) {
            Ok(Val::String(b)) => assert_eq!(b.as_slice(), b"c"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(vm.isset_dim(&s, &Val::Int(2), false).unwrap());
        assert!(!vm.isset_dim(&s, &Val::Int(3), false).unwrap());
        assert!(!vm.isset_dim(&s, &Val::string("x"), false).unwrap());
    }

    #[test]
    fn test_empty_on_falsy_element() {
        let mut vm = vm();
        let arr = Val::Array(Rc::new(ArrayData::from(vec![Val::Int(0), Val::Null])));
        assert!(vm.isset_dim(&arr, &Val::Int(0), false).unwrap());
        assert!(vm.isset_dim(&arr, &Val::Int(0), true).unwrap());
        assert!(!vm.isset_dim(&arr, &Val::Int(1), false).unwrap());
    }
}
