//! PHP type juggling and conversion
//!
//! Implements PHP's automatic type conversion following Zend semantics.
//!
//! ## PHP Type Juggling Rules
//!
//! ### To String
//! - Integers/floats: standard representation (floats with 14 significant digits)
//! - true → "1", false → ""
//! - null → ""
//! - Arrays → "Array"
//! - Objects → `__toString()` or `Error`
//!
//! ### Declared types
//!
//! Parameter, return and property types accept an exact match first. In
//! coercive mode (no `strict_types`) scalars are then converted: numeric
//! strings to int/float, ints to string, scalars to bool. `int` is always
//! accepted where `float` is declared.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_operators.c` - conversion functions
//! - Zend: `$PHP_SRC_PATH/Zend/zend_execute.c` - zend_verify_scalar_type_hint
//! - PHP Manual: https://www.php.net/manual/en/language.types.type-juggling.php

use crate::compiler::chunk::TypeHint;
use crate::core::value::{
    ArrayData, ArrayKey, NumericKind, ObjectData, Symbol, Val, float_to_int, parse_numeric_prefix,
};
use crate::runtime::context::ClassDef;
use crate::vm::engine::{VM, VmError};
use crate::vm::opcode::CastType;
use std::rc::Rc;

/// Classes `self`, `parent` and `static` resolve against while checking a type.
#[derive(Clone, Default)]
pub struct TypeScope {
    pub scope: Option<Rc<ClassDef>>,
    pub static_class: Option<Rc<ClassDef>>,
}

impl VM {
    /// String conversion, calling `__toString` on objects.
    pub fn to_string_bytes(&mut self, val: &Val) -> Result<Vec<u8>, VmError> {
        match val {
            Val::Object(obj) => {
                let to_string = self.program.sym.to_string;
                let Some(method) = obj.class().find_method(to_string).cloned() else {
                    let name = self.class_name(obj.class());
                    return Err(self.throw_error(
                        b"Error",
                        format!("Object of class {} could not be converted to string", name),
                    ));
                };
                let result =
                    self.call_method_entry(Some(obj.clone()), obj.class().clone(), &method, Vec::new())?;
                match result {
                    Val::String(s) => Ok(s.to_vec()),
                    other => {
                        let name = self.class_name(obj.class());
                        let given = self.debug_type(&other);
                        Err(self.type_error(format!(
                            "{}::__toString(): Return value must be of type string, {} returned",
                            name, given
                        )))
                    }
                }
            }
            Val::Ref(r) => {
                let inner = r.get();
                self.to_string_bytes(&inner)
            }
            other => Ok(other.scalar_to_bytes()),
        }
    }

    pub fn to_string_val(&mut self, val: &Val) -> Result<Val, VmError> {
        match val {
            Val::String(_) => Ok(val.clone()),
            other => Ok(Val::string(self.to_string_bytes(other)?)),
        }
    }

    /// `(int)`, `(string)`, `(array)`, ... casts.
    pub(crate) fn cast(&mut self, val: Val, ty: CastType) -> Result<Val, VmError> {
        let val = val.into_deref();
        Ok(match ty {
            CastType::Int => Val::Int(val.to_int()),
            CastType::Float => Val::Float(val.to_float()),
            CastType::Bool => Val::Bool(val.to_bool()),
            CastType::String => self.to_string_val(&val)?,
            CastType::Null => Val::Null,
            CastType::Array => match val {
                Val::Array(_) => val,
                Val::Null | Val::Uninitialized => Val::empty_array(),
                Val::Object(obj) if obj.class().lname == self.program.sym.closure => {
                    Val::Array(Rc::new(ArrayData::from(vec![Val::Object(obj)])))
                }
                Val::Object(obj) => Val::Array(Rc::new(self.object_to_array(&obj))),
                scalar => Val::Array(Rc::new(ArrayData::from(vec![scalar]))),
            },
            CastType::Object => match val {
                Val::Object(_) => val,
                Val::Array(arr) => {
                    let obj = self.new_std_class()?;
                    for (key, value) in arr.map.iter() {
                        let name = self.program.interner.intern(&key.to_bytes());
                        obj.set_property(name, value.deref_clone());
                    }
                    Val::Object(obj)
                }
                Val::Null | Val::Uninitialized => Val::Object(self.new_std_class()?),
                scalar => {
                    let obj = self.new_std_class()?;
                    let name = self.program.interner.intern(b"scalar");
                    obj.set_property(name, scalar);
                    Val::Object(obj)
                }
            },
        })
    }

    pub(crate) fn new_std_class(&mut self) -> Result<crate::core::value::ObjectRef, VmError> {
        let class = self
            .program
            .class(self.program.sym.std_class)
            .cloned()
            .ok_or_else(|| VmError::Fatal("stdClass is not registered".into()))?;
        Ok(self.store.alloc(class, ObjectData::default(), false))
    }

    /// Properties of an object as an array, in declaration order.
    pub(crate) fn object_to_array(&self, obj: &crate::core::value::ObjectRef) -> ArrayData {
        let mut arr = ArrayData::new();
        for (name, value) in obj.borrow().properties.iter() {
            if matches!(value, Val::Uninitialized) {
                continue;
            }
            let key = ArrayKey::from_bytes(self.program.interner.text(*name));
            arr.insert_raw(key, value.clone());
        }
        arr
    }

    /// Name of a dynamically named method or function.
    pub(crate) fn member_name(&mut self, val: &Val, what: &str) -> Result<Symbol, VmError> {
        match val {
            Val::String(s) => Ok(self.program.interner.intern(s)),
            _ => {
                let msg = match what {
                    "method" => "Method name must be a string".to_string(),
                    other => format!("{} name must be a string", other),
                };
                Err(self.throw_error(b"Error", msg))
            }
        }
    }

    /// Name of a dynamically named property (`$obj->$name`).
    pub(crate) fn property_name(&mut self, val: &Val) -> Result<Symbol, VmError> {
        let bytes = self.to_string_bytes(val)?;
        Ok(self.program.interner.intern(&bytes))
    }

    /// Checks `val` against a declared type, converting scalars in coercive
    /// mode. Returns `None` when the value does not fit.
    pub(crate) fn coerce_to_type(
        &mut self,
        val: Val,
        hint: &TypeHint,
        strict: bool,
        scope: &TypeScope,
    ) -> Result<Option<Val>, VmError> {
        if self.matches_type(&val, hint, scope)? {
            return Ok(Some(val));
        }
        if let Val::Int(i) = val
            && accepts_scalar(hint, &TypeHint::Float)
        {
            return Ok(Some(Val::Float(i as f64)));
        }
        if strict {
            return Ok(None);
        }
        self.coerce_scalar(val, hint)
    }

    fn matches_type(&mut self, val: &Val, hint: &TypeHint, scope: &TypeScope) -> Result<bool, VmError> {
        Ok(match hint {
            TypeHint::Mixed => true,
            TypeHint::Null | TypeHint::Void => val.is_null(),
            TypeHint::Never => false,
            TypeHint::Int => matches!(val, Val::Int(_)),
            TypeHint::Float => matches!(val, Val::Float(_)),
            TypeHint::String => matches!(val, Val::String(_)),
            TypeHint::Bool => matches!(val, Val::Bool(_)),
            TypeHint::True => matches!(val, Val::Bool(true)),
            TypeHint::False => matches!(val, Val::Bool(false)),
            TypeHint::Array => matches!(val, Val::Array(_)),
            TypeHint::Object => matches!(val, Val::Object(_)),
            TypeHint::Iterable => match val {
                Val::Array(_) => true,
                Val::Object(obj) => obj.class().is_a(self.program.sym.traversable),
                _ => false,
            },
            TypeHint::Callable => self.is_callable(val),
            TypeHint::Class(name) => match val {
                Val::Object(obj) => {
                    let lname = self.short_lower(*name);
                    obj.class().is_a(lname)
                }
                _ => false,
            },
            TypeHint::SelfType => match (val, &scope.scope) {
                (Val::Object(obj), Some(class)) => obj.class().is_a(class.lname),
                _ => false,
            },
            TypeHint::Parent => match (val, scope.scope.as_ref().and_then(|c| c.parent.as_ref())) {
                (Val::Object(obj), Some(parent)) => obj.class().is_a(parent.lname),
                _ => false,
            },
            TypeHint::Static => match (val, scope.static_class.as_ref().or(scope.scope.as_ref())) {
                (Val::Object(obj), Some(class)) => obj.class().is_a(class.lname),
                _ => false,
            },
            TypeHint::Nullable(inner) => val.is_null() || self.matches_type(val, inner, scope)?,
            TypeHint::Union(types) => {
                for ty in types {
                    if self.matches_type(val, ty, scope)? {
                        return Ok(true);
                    }
                }
                false
            }
            TypeHint::Intersection(types) => {
                for ty in types {
                    if !self.matches_type(val, ty, scope)? {
                        return Ok(false);
                    }
                }
                true
            }
        })
    }

    /// Lowercased last segment of a possibly qualified class name.
    pub(crate) fn short_lower(&mut self, name: Symbol) -> Symbol {
        let text = self.program.interner.text(name);
        if text.contains(&b'\\') {
            let short = match text.iter().rposition(|b| *b == b'\\') {
                Some(i) => text[i + 1..].to_vec(),
                None => text.to_vec(),
            };
            return self.program.interner.intern_lower(&short);
        }
        self.lower(name)
    }

    fn coerce_scalar(&mut self, val: Val, hint: &TypeHint) -> Result<Option<Val>, VmError> {
        // Preference order of the coercive mode: int, float, string, bool
        let numeric = match &val {
            Val::String(s) => match parse_numeric_prefix(s) {
                (n, NumericKind::Full) => Some(n),
                _ => None,
            },
            _ => None,
        };
        if accepts_scalar(hint, &TypeHint::Int) {
            match (&val, numeric) {
                (Val::Float(f), _) if f.is_finite() && f.fract() == 0.0 => return Ok(Some(Val::Int(*f as i64))),
                (Val::Bool(b), _) => return Ok(Some(Val::Int(i64::from(*b)))),
                (Val::String(_), Some(crate::core::value::Numeric::Int(i))) => return Ok(Some(Val::Int(i))),
                (Val::String(_), Some(crate::core::value::Numeric::Float(f)))
                    if !accepts_scalar(hint, &TypeHint::Float) && f.is_finite() && f.fract() == 0.0 =>
                {
                    return Ok(Some(Val::Int(float_to_int(f))));
                }
                _ => {}
            }
        }
        if accepts_scalar(hint, &TypeHint::Float) {
            match (&val, numeric) {
                (Val::Bool(b), _) => return Ok(Some(Val::Float(f64::from(u8::from(*b))))),
                (Val::String(_), Some(n)) => return Ok(Some(Val::Float(n.as_f64()))),
                _ => {}
            }
        }
        if accepts_scalar(hint, &TypeHint::String) {
            match &val {
                Val::Int(_) | Val::Float(_) | Val::Bool(_) => return Ok(Some(Val::string(val.scalar_to_bytes()))),
                Val::Object(obj) if obj.class().find_method(self.program.sym.to_string).is_some() => {
                    return Ok(Some(self.to_string_val(&val)?));
                }
                _ => {}
            }
        }
        if accepts_scalar(hint, &TypeHint::Bool)
            && matches!(val, Val::Int(_) | Val::Float(_) | Val::String(_))
        {
            return Ok(Some(Val::Bool(val.to_bool())));
        }
        Ok(None)
    }

    /// Source form of a declared type for error messages.
    pub fn type_hint_display(&self, hint: &TypeHint) -> String {
        match hint {
            TypeHint::Int => "int".into(),
            TypeHint::Float => "float".into(),
            TypeHint::String => "string".into(),
            TypeHint::Bool => "bool".into(),
            TypeHint::True => "true".into(),
            TypeHint::False => "false".into(),
            TypeHint::Array => "array".into(),
            TypeHint::Object => "object".into(),
            TypeHint::Callable => "callable".into(),
            TypeHint::Iterable => "iterable".into(),
            TypeHint::Mixed => "mixed".into(),
            TypeHint::Void => "void".into(),
            TypeHint::Never => "never".into(),
            TypeHint::Null => "null".into(),
            TypeHint::Static => "static".into(),
            TypeHint::SelfType => "self".into(),
            TypeHint::Parent => "parent".into(),
            TypeHint::Class(name) => self.sym_text(*name).trim_start_matches('\\').to_string(),
            TypeHint::Nullable(inner) => format!("?{}", self.type_hint_display(inner)),
            TypeHint::Union(types) => types
                .iter()
                .map(|t| self.type_hint_display(t))
                .collect::<Vec<_>>()
                .join("|"),
            TypeHint::Intersection(types) => types
                .iter()
                .map(|t| self.type_hint_display(t))
                .collect::<Vec<_>>()
                .join("&"),
        }
    }
}

/// Whether `hint` lists the scalar type `scalar` directly.
fn accepts_scalar(hint: &TypeHint, scalar: &TypeHint) -> bool {
    match hint {
        TypeHint::Nullable(inner) => accepts_scalar(inner, scalar),
        TypeHint::Union(types) => types.iter().any(|t| accepts_scalar(t, scalar)),
        other => other == scalar,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::context::Program;

    fn vm() -> VM {
        VM::new(Program::new())
    }

    #[test]
    fn numeric_strings_coerce_to_int() {
        let mut vm = vm();
        let scope = TypeScope::default();
        let result = vm.coerce_to_type(Val::string("42"), &TypeHint::Int, false, &scope);
        assert!(matches!(result, Ok(Some(Val::Int(42)))));
        let result = vm.coerce_to_type(Val::string("42abc"), &TypeHint::Int, false, &scope);
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn strict_mode_only_widens_int_to_float() {
        let mut vm = vm();
        let scope = TypeScope::default();
        let result = vm.coerce_to_type(Val::Int(3), &TypeHint::Float, true, &scope);
        assert!(matches!(result, Ok(Some(Val::Float(f))) if f == 3.0));
        let result = vm.coerce_to_type(Val::string("3"), &TypeHint::Int, true, &scope);
        assert!(matches!(result, Ok(None)));
    }

    #[test]
    fn nullable_union_display() {
        let vm = vm();
        let hint = TypeHint::Union(vec![TypeHint::Int, TypeHint::String, TypeHint::Null]);
        assert_eq!(vm.type_hint_display(&hint), "int|string|null");
        assert_eq!(vm.type_hint_display(&TypeHint::Nullable(Box::new(TypeHint::Array))), "?array");
    }
}
