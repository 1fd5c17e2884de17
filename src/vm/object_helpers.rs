//! Object creation and property access
//!
//! Objects are created with their declared property defaults, evaluated once
//! per class. Property reads and writes go through one classification step
//! that decides between plain storage, a property hook, a magic method
//! (`__get`, `__set`, `__isset`, `__unset`) or an access error.
//!
//! ## Rules
//!
//! - Visibility is checked against the class scope of the executing code.
//! - A hooked property is read and written through its hooks, except from
//!   inside its own hook, where `$this->prop` is the backing storage.
//! - Magic methods cover inaccessible and missing properties; a magic call
//!   for the same object and property is not re-entered, the nested access
//!   uses plain storage instead.
//! - Readonly properties accept one initialization from inside the
//!   declaring class; after that every write fails.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_object_handlers.c` - zend_std_read_property, zend_std_write_property
//! - Zend: `$PHP_SRC_PATH/Zend/zend_objects.c` - zend_objects_clone_members

use crate::compiler::chunk::{ConstInit, LazyVal, PropertyHooks, UserFunc};
use crate::core::value::{ObjectData, ObjectRef, Symbol, Val};
use crate::runtime::context::{ClassDef, LazyInit, PropertyInfo};
use crate::vm::engine::{GuardKind, VM, VmError};
use crate::vm::frame::{Callee, PendingCall};
use crate::vm::type_conversion::TypeScope;
use indexmap::IndexMap;
use std::rc::Rc;

/// How a property access on a particular object resolves.
enum PropAccess {
    /// Accessible storage; `None` for dynamic properties
    Direct(Option<Rc<PropertyInfo>>),
    Hooked(Rc<PropertyInfo>, Rc<PropertyHooks>),
    Inaccessible(Rc<PropertyInfo>),
    Missing,
}

impl VM {
    fn wants_release(&self, class: &ClassDef) -> bool {
        class.find_method(self.program.sym.destruct).is_some() || class.lname == self.program.sym.generator
    }

    /// Allocates an object with its default properties; no constructor runs.
    /// Reference: $PHP_SRC_PATH/Zend/zend_objects.c - zend_object_std_init
    pub fn instantiate(&mut self, class: &Rc<ClassDef>) -> Result<ObjectRef, VmError> {
        let mut properties = IndexMap::with_capacity(class.properties.len());
        for (name, info) in class.properties.iter() {
            if info.is_virtual() {
                continue;
            }
            let value = match &info.default {
                Some(lazy) => self.eval_lazy(lazy, info.declaring_class)?,
                None => Val::Uninitialized,
            };
            properties.insert(*name, value);
        }
        let wants_release = self.wants_release(class);
        let obj = self.store.alloc(
            class.clone(),
            ObjectData {
                properties,
                internal: None,
            },
            wants_release,
        );
        if class.is_a(self.program.sym.throwable) {
            self.fill_throwable(&obj);
        }
        Ok(obj)
    }

    fn eval_lazy(&mut self, lazy: &LazyInit, declaring: Symbol) -> Result<Val, VmError> {
        self.eval_const_init(&lazy.init, &lazy.value, declaring)
    }

    /// Value of a constant or default initializer, computed on first use.
    pub(crate) fn eval_const_init(
        &mut self,
        init: &ConstInit,
        cache: &LazyVal,
        declaring: Symbol,
    ) -> Result<Val, VmError> {
        if let Some(val) = cache.get() {
            return Ok(val.clone());
        }
        match init {
            ConstInit::Const(val) => Ok(val.clone()),
            ConstInit::Thunk(func) => {
                let val = self.run_thunk(func, declaring)?;
                Ok(cache.set(val))
            }
        }
    }

    /// Runs an initializer body in the scope of class `declaring`.
    fn run_thunk(&mut self, func: &Rc<UserFunc>, declaring: Symbol) -> Result<Val, VmError> {
        let class = self.program.class(declaring).cloned();
        let call = PendingCall::new(Callee::User {
            func: func.clone(),
            this: None,
            scope: class.clone(),
            static_class: class,
            captures: None,
        });
        self.call_pending(call)
    }

    fn classify(&self, obj: &ObjectRef, name: Symbol) -> PropAccess {
        let scope = self.current_scope();
        match obj.class().properties.get(&name) {
            Some(info) => {
                if !self.is_visible_from(info.declaring_class, info.visibility, scope.as_deref()) {
                    return PropAccess::Inaccessible(info.clone());
                }
                if let Some(hooks) = &info.hooks {
                    let in_own_hook = self
                        .frames
                        .last()
                        .and_then(|f| f.hook)
                        .is_some_and(|(addr, prop)| addr == obj.addr() && prop == name);
                    if !in_own_hook {
                        return PropAccess::Hooked(info.clone(), hooks.clone());
                    }
                }
                PropAccess::Direct(Some(info.clone()))
            }
            None if obj.borrow().properties.contains_key(&name) => PropAccess::Direct(None),
            None => PropAccess::Missing,
        }
    }

    fn has_magic(&self, obj: &ObjectRef, method: Symbol, name: Symbol, kind: GuardKind) -> bool {
        obj.class().find_method(method).is_some() && !self.guards.contains(&(obj.addr(), name, kind))
    }

    fn call_magic(
        &mut self,
        obj: &ObjectRef,
        method: Symbol,
        name: Symbol,
        kind: GuardKind,
        mut args: Vec<Val>,
    ) -> Result<Val, VmError> {
        let Some(entry) = obj.class().find_method(method).cloned() else {
            return Ok(Val::Null);
        };
        args.insert(0, Val::string(self.program.interner.text(name).to_vec()));
        let key = (obj.addr(), name, kind);
        self.guards.insert(key);
        let result = self.call_method_entry(Some(obj.clone()), obj.class().clone(), &entry, args);
        self.guards.remove(&key);
        result
    }

    /// Runs a property hook with `$this` bound and backing access enabled.
    fn call_hook(
        &mut self,
        obj: &ObjectRef,
        info: &PropertyInfo,
        func: &Rc<UserFunc>,
        args: Vec<Val>,
    ) -> Result<Val, VmError> {
        let mut call = PendingCall::new(Callee::User {
            func: func.clone(),
            this: Some(obj.clone()),
            scope: self.program.class(info.declaring_class).cloned(),
            static_class: Some(obj.class().clone()),
            captures: None,
        });
        call.args.extend(args);
        self.call_pending_with(call, |frame| frame.hook = Some((obj.addr(), info.name)))
    }

    fn uninitialized_error(&mut self, obj: &ObjectRef, name: Symbol) -> VmError {
        let class = self.declaring_class_name(obj, name);
        let prop = self.sym_text(name);
        self.throw_error(
            b"Error",
            format!("Typed property {}::${} must not be accessed before initialization", class, prop),
        )
    }

    fn declaring_class_name(&self, obj: &ObjectRef, name: Symbol) -> String {
        match obj.class().properties.get(&name).and_then(|p| self.program.class(p.declaring_class)) {
            Some(class) => self.class_name(class),
            None => self.class_name(obj.class()),
        }
    }

    fn inaccessible_error(&mut self, obj: &ObjectRef, info: &PropertyInfo) -> VmError {
        let class = self.declaring_class_name(obj, info.name);
        let prop = self.sym_text(info.name);
        let msg = format!("Cannot access {} property {}::${}", info.visibility.as_str(), class, prop);
        self.throw_error(b"Error", msg)
    }

    /// `$obj->name` on any value.
    pub(crate) fn read_prop(&mut self, target: &Val, name: Symbol, quiet: bool) -> Result<Val, VmError> {
        match target {
            Val::Object(obj) => self.read_object_prop(obj, name, quiet),
            Val::Ref(r) => {
                let inner = r.get();
                self.read_prop(&inner, name, quiet)
            }
            _ => Ok(Val::Null),
        }
    }

    /// Reference: $PHP_SRC_PATH/Zend/zend_object_handlers.c - zend_std_read_property
    pub fn read_object_prop(&mut self, obj: &ObjectRef, name: Symbol, quiet: bool) -> Result<Val, VmError> {
        let sym = self.program.sym;
        match self.classify(obj, name) {
            PropAccess::Direct(info) => {
                let stored = obj.borrow().properties.get(&name).map(Val::deref_clone);
                match stored {
                    Some(Val::Uninitialized) | None => {
                        if self.has_magic(obj, sym.get, name, GuardKind::Get) {
                            return self.magic_read(obj, name, quiet);
                        }
                        if info.is_some_and(|i| i.type_hint.is_some()) && !quiet {
                            return Err(self.uninitialized_error(obj, name));
                        }
                        Ok(Val::Null)
                    }
                    Some(val) => Ok(val),
                }
            }
            PropAccess::Hooked(info, hooks) => match &hooks.get {
                Some(get) => self.call_hook(obj, &info, get, Vec::new()),
                None => Ok(obj.property(name).unwrap_or_default()),
            },
            PropAccess::Inaccessible(info) => {
                if self.has_magic(obj, sym.get, name, GuardKind::Get) {
                    return self.magic_read(obj, name, quiet);
                }
                if quiet {
                    return Ok(Val::Null);
                }
                Err(self.inaccessible_error(obj, &info))
            }
            PropAccess::Missing => {
                if self.has_magic(obj, sym.get, name, GuardKind::Get) {
                    return self.magic_read(obj, name, quiet);
                }
                Ok(Val::Null)
            }
        }
    }

    fn magic_read(&mut self, obj: &ObjectRef, name: Symbol, quiet: bool) -> Result<Val, VmError> {
        let sym = self.program.sym;
        if quiet && obj.class().find_method(sym.isset).is_some() {
            let present = self.call_magic(obj, sym.isset, name, GuardKind::Isset, Vec::new())?;
            if !present.to_bool() {
                return Ok(Val::Null);
            }
        }
        Ok(self.call_magic(obj, sym.get, name, GuardKind::Get, Vec::new())?.into_deref())
    }

    /// `$obj->name = $val`
    /// Reference: $PHP_SRC_PATH/Zend/zend_object_handlers.c - zend_std_write_property
    pub fn write_prop(&mut self, obj: &ObjectRef, name: Symbol, val: Val) -> Result<(), VmError> {
        let sym = self.program.sym;
        match self.classify(obj, name) {
            PropAccess::Direct(Some(info)) => {
                let val = self.check_property_write(obj, &info, val)?;
                self.store_property(obj, name, val);
                Ok(())
            }
            PropAccess::Direct(None) => {
                self.store_property(obj, name, val);
                Ok(())
            }
            PropAccess::Hooked(info, hooks) => match &hooks.set {
                Some(set) => self.call_hook(obj, &info, set, vec![val]).map(|_| ()),
                None if hooks.is_virtual => {
                    let class = self.declaring_class_name(obj, name);
                    let prop = self.sym_text(name);
                    Err(self.throw_error(b"Error", format!("Property {}::${} is read-only", class, prop)))
                }
                None => {
                    let val = self.check_property_write(obj, &info, val)?;
                    self.store_property(obj, name, val);
                    Ok(())
                }
            },
            PropAccess::Inaccessible(info) => {
                if self.has_magic(obj, sym.set, name, GuardKind::Set) {
                    self.call_magic(obj, sym.set, name, GuardKind::Set, vec![val])?;
                    return Ok(());
                }
                if info.is_readonly && self.current_scope().is_none_or(|s| s.lname != info.declaring_class) {
                    let class = self.declaring_class_name(obj, name);
                    let prop = self.sym_text(name);
                    let initialized = !matches!(obj.property(name), Some(Val::Uninitialized) | None);
                    let msg = if initialized {
                        format!("Cannot modify {} readonly property {}::${}", info.visibility.as_str(), class, prop)
                    } else {
                        format!(
                            "Cannot initialize readonly property {}::${} from {}",
                            class,
                            prop,
                            self.scope_description()
                        )
                    };
                    return Err(self.throw_error(b"Error", msg));
                }
                Err(self.inaccessible_error(obj, &info))
            }
            PropAccess::Missing => {
                if self.has_magic(obj, sym.set, name, GuardKind::Set) {
                    self.call_magic(obj, sym.set, name, GuardKind::Set, vec![val])?;
                    return Ok(());
                }
                if obj.class().is_readonly {
                    let class = self.class_name(obj.class());
                    let prop = self.sym_text(name);
                    return Err(self.throw_error(
                        b"Error",
                        format!("Cannot create dynamic property {}::${}", class, prop),
                    ));
                }
                self.store_property(obj, name, val);
                Ok(())
            }
        }
    }

    /// Writes through a reference binding held in the property slot.
    fn store_property(&self, obj: &ObjectRef, name: Symbol, val: Val) {
        let cell = match obj.borrow().properties.get(&name) {
            Some(Val::Ref(cell)) => Some(cell.clone()),
            _ => None,
        };
        match cell {
            Some(cell) => cell.set(val),
            None => obj.set_property(name, val),
        }
    }

    /// Readonly and declared-type checks of a write to accessible storage.
    fn check_property_write(&mut self, obj: &ObjectRef, info: &PropertyInfo, val: Val) -> Result<Val, VmError> {
        if info.is_readonly {
            let class = self.declaring_class_name(obj, info.name);
            let prop = self.sym_text(info.name);
            let initialized = !matches!(obj.property(info.name), Some(Val::Uninitialized) | None);
            if initialized {
                return Err(self.throw_error(b"Error", format!("Cannot modify readonly property {}::${}", class, prop)));
            }
            let in_class = self.current_scope().is_some_and(|s| s.lname == info.declaring_class);
            if !in_class {
                let msg = format!(
                    "Cannot initialize readonly property {}::${} from {}",
                    class,
                    prop,
                    self.scope_description()
                );
                return Err(self.throw_error(b"Error", msg));
            }
        }
        let Some(hint) = &info.type_hint else {
            return Ok(val);
        };
        let scope = TypeScope {
            scope: self.program.class(info.declaring_class).cloned(),
            static_class: Some(obj.class().clone()),
        };
        let strict = self.strict_types();
        let val = val.into_deref();
        match self.coerce_to_type(val.clone(), hint, strict, &scope)? {
            Some(coerced) => Ok(coerced),
            None => {
                let class = self.declaring_class_name(obj, info.name);
                let prop = self.sym_text(info.name);
                let given = self.debug_type(&val);
                let expected = self.type_hint_display(hint);
                Err(self.type_error(format!(
                    "Cannot assign {} to property {}::${} of type {}",
                    given, class, prop, expected
                )))
            }
        }
    }

    /// Storage cell of a property for `&$obj->prop` and in-place updates.
    /// Returns `None` when the property is served by hooks or magic methods.
    pub(crate) fn property_storage(&mut self, obj: &ObjectRef, name: Symbol) -> Result<Option<()>, VmError> {
        match self.classify(obj, name) {
            PropAccess::Direct(Some(info)) => {
                if info.is_readonly && !matches!(obj.property(name), Some(Val::Uninitialized) | None) {
                    let class = self.declaring_class_name(obj, name);
                    let prop = self.sym_text(name);
                    return Err(self.throw_error(b"Error", format!("Cannot modify readonly property {}::${}", class, prop)));
                }
                Ok(Some(()))
            }
            PropAccess::Direct(None) => Ok(Some(())),
            PropAccess::Hooked(..) => Ok(None),
            PropAccess::Inaccessible(info) => {
                if self.has_magic(obj, self.program.sym.get, name, GuardKind::Get) {
                    return Ok(None);
                }
                Err(self.inaccessible_error(obj, &info))
            }
            PropAccess::Missing => {
                if self.has_magic(obj, self.program.sym.get, name, GuardKind::Get) {
                    return Ok(None);
                }
                Ok(Some(()))
            }
        }
    }

    /// `isset($obj->name)` / `empty($obj->name)`
    pub(crate) fn isset_prop(&mut self, target: &Val, name: Symbol, empty: bool) -> Result<bool, VmError> {
        let obj = match target {
            Val::Object(obj) => obj.clone(),
            Val::Ref(r) => {
                let inner = r.get();
                return self.isset_prop(&inner, name, empty);
            }
            _ => return Ok(empty),
        };
        let sym = self.program.sym;
        let value = match self.classify(&obj, name) {
            PropAccess::Direct(_) => match obj.property(name) {
                Some(Val::Uninitialized) | None if self.has_magic(&obj, sym.isset, name, GuardKind::Isset) => {
                    return self.magic_isset(&obj, name, empty);
                }
                Some(val) => val,
                None => Val::Null,
            },
            PropAccess::Hooked(info, hooks) => match &hooks.get {
                Some(get) => self.call_hook(&obj, &info, get, Vec::new())?,
                None => obj.property(name).unwrap_or_default(),
            },
            PropAccess::Inaccessible(_) | PropAccess::Missing => {
                if self.has_magic(&obj, sym.isset, name, GuardKind::Isset) {
                    return self.magic_isset(&obj, name, empty);
                }
                return Ok(empty);
            }
        };
        Ok(if empty { !value.to_bool() } else { !value.is_null() })
    }

    fn magic_isset(&mut self, obj: &ObjectRef, name: Symbol, empty: bool) -> Result<bool, VmError> {
        let sym = self.program.sym;
        let present = self.call_magic(obj, sym.isset, name, GuardKind::Isset, Vec::new())?.to_bool();
        if !empty {
            return Ok(present);
        }
        if !present {
            return Ok(true);
        }
        if self.has_magic(obj, sym.get, name, GuardKind::Get) {
            let value = self.call_magic(obj, sym.get, name, GuardKind::Get, Vec::new())?;
            return Ok(!value.to_bool());
        }
        Ok(false)
    }

    /// `unset($obj->name)`
    pub(crate) fn unset_prop(&mut self, obj: &ObjectRef, name: Symbol) -> Result<(), VmError> {
        let sym = self.program.sym;
        match self.classify(obj, name) {
            PropAccess::Direct(info) => {
                if let Some(info) = info
                    && info.is_readonly
                {
                    let class = self.declaring_class_name(obj, name);
                    let prop = self.sym_text(name);
                    return Err(self.throw_error(b"Error", format!("Cannot unset readonly property {}::${}", class, prop)));
                }
                let old = obj.borrow_mut().properties.shift_remove(&name);
                drop(old);
                Ok(())
            }
            PropAccess::Hooked(..) => {
                let class = self.declaring_class_name(obj, name);
                let prop = self.sym_text(name);
                Err(self.throw_error(b"Error", format!("Cannot unset hooked property {}::${}", class, prop)))
            }
            PropAccess::Inaccessible(info) => {
                if self.has_magic(obj, sym.unset, name, GuardKind::Unset) {
                    self.call_magic(obj, sym.unset, name, GuardKind::Unset, Vec::new())?;
                    return Ok(());
                }
                Err(self.inaccessible_error(obj, &info))
            }
            PropAccess::Missing => {
                if self.has_magic(obj, sym.unset, name, GuardKind::Unset) {
                    self.call_magic(obj, sym.unset, name, GuardKind::Unset, Vec::new())?;
                }
                Ok(())
            }
        }
    }

    /// `clone $obj`: shallow copy of the properties, then `__clone`.
    /// Reference: $PHP_SRC_PATH/Zend/zend_objects.c - zend_objects_clone_obj
    pub(crate) fn clone_value(&mut self, val: &Val) -> Result<Val, VmError> {
        let Val::Object(obj) = val else {
            return Err(self.throw_error(b"Error", "__clone method called on non-object"));
        };
        let class = obj.class().clone();
        if class.lname == self.program.sym.generator {
            return Err(self.throw_error(
                b"Error",
                "Trying to clone an uncloneable object of class Generator",
            ));
        }
        let data = {
            let source = obj.borrow();
            ObjectData {
                properties: source.properties.clone(),
                internal: source.internal.clone(),
            }
        };
        let wants_release = self.wants_release(&class);
        let copy = self.store.alloc(class.clone(), data, wants_release);
        if let Some(method) = class.find_method(self.program.sym.clone).cloned() {
            self.call_method_entry(Some(copy.clone()), class, &method, Vec::new())?;
        }
        Ok(Val::Object(copy))
    }
}
