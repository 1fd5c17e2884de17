//! Calls: function, method, static, constructor and callable-value calls
//!
//! A call is assembled in two steps. An `Init*` instruction resolves the
//! callee and pushes a [`PendingCall`]; `Send*` instructions append the
//! arguments; `DoCall` binds them to parameters and either pushes a new
//! frame (user code) or runs the builtin directly.
//!
//! ## Method resolution
//!
//! - A private method of the calling class wins over an overriding method of
//!   the same name in a subclass.
//! - Inaccessible or missing methods fall back to `__call` (object context)
//!   or `__callStatic`.
//! - `self::`, `parent::` and `static::` forward the late static binding
//!   class; a non-static method called that way from a compatible object
//!   context keeps `$this`.
//!
//! ## Argument binding
//!
//! Positional arguments fill parameters in order, named arguments follow,
//! then constant defaults. Parameters with a computed default stay unset
//! and are filled by the `RecvDefault` prologue of the callee.
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_vm_def.h` - ZEND_INIT_FCALL, ZEND_INIT_METHOD_CALL, ZEND_DO_FCALL
//! - Zend: `$PHP_SRC_PATH/Zend/zend_execute.c` - zend_handle_named_arg, zend_verify_arg_type
//! - Zend: `$PHP_SRC_PATH/Zend/zend_closures.c`

use crate::compiler::chunk::{DefaultValue, UserFunc};
use crate::core::value::{ArrayData, ArrayKey, InternalState, ObjectRef, Reference, Symbol, Tracer, Val, Visibility};
use crate::runtime::context::{ClassDef, MethodEntry, MethodImpl};
use crate::vm::engine::{VM, VmError};
use crate::vm::frame::{ArgList, Callee, Frame, PendingCall};
use crate::vm::opcode::ClassRef;
use crate::vm::type_conversion::TypeScope;
use crate::vm::visibility::MemberKind;
use std::any::Any;
use std::rc::Rc;

/// Payload of a `Closure` object.
pub struct ClosureState {
    pub callee: Callee,
    /// Method name when the closure forwards to `__call`/`__callStatic`
    pub magic: Option<Val>,
}

impl InternalState for ClosureState {
    fn trace(&self, tracer: &mut dyn Tracer) {
        self.callee.trace(tracer);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }
}

/// Outcome of preparing a call.
pub(crate) enum Prepared {
    /// User code to run in a new frame
    Frame(Frame),
    /// Already finished (builtins, generator creation)
    Done(Val),
}

/// Method lookup without error reporting.
pub(crate) enum MethodLookup {
    Found(Rc<MethodEntry>),
    Inaccessible(Rc<MethodEntry>),
    Missing,
}

impl VM {
    // ---- resolution ------------------------------------------------------

    pub(crate) fn lookup_method(&self, class: &Rc<ClassDef>, lname: Symbol) -> MethodLookup {
        let scope = self.current_scope();
        if let Some(scope) = &scope
            && class.is_a(scope.lname)
            && let Some(own) = scope.methods.get(&lname)
            && own.visibility == Visibility::Private
            && own.scope == scope.lname
        {
            return MethodLookup::Found(own.clone());
        }
        match class.find_method(lname) {
            Some(entry) => {
                if self.method_visible_from(class, lname, entry.visibility, entry.scope, scope.as_deref()) {
                    MethodLookup::Found(entry.clone())
                } else {
                    MethodLookup::Inaccessible(entry.clone())
                }
            }
            None => MethodLookup::Missing,
        }
    }

    /// Callee for a resolved method. `this` is dropped for static methods.
    pub(crate) fn method_callee(
        &self,
        entry: &MethodEntry,
        this: Option<ObjectRef>,
        static_class: Rc<ClassDef>,
    ) -> Callee {
        let this = if entry.is_static { None } else { this };
        match &entry.func {
            MethodImpl::User(func) => Callee::User {
                func: func.clone(),
                this,
                scope: self.program.class(entry.scope).cloned(),
                static_class: Some(static_class),
                captures: None,
            },
            MethodImpl::Native(handler) => Callee::NativeMethod {
                handler: *handler,
                this,
            },
        }
    }

    fn function_callee(&self, func: &Rc<UserFunc>) -> Callee {
        Callee::User {
            func: func.clone(),
            this: None,
            scope: None,
            static_class: None,
            captures: None,
        }
    }

    /// Function by name, case-insensitive. Namespace prefixes are ignored.
    pub(crate) fn find_function(&self, name: &[u8]) -> Option<Callee> {
        let name = name.strip_prefix(b"\\").unwrap_or(name);
        let name = match name.iter().rposition(|b| *b == b'\\') {
            Some(i) => &name[i + 1..],
            None => name,
        };
        if let Some(lname) = self.program.interner.find_lower(name)
            && let Some(func) = self.program.functions.get(&lname)
        {
            return Some(self.function_callee(func));
        }
        self.program.natives.get(name).copied().map(Callee::Native)
    }

    fn undefined_method(&mut self, class: &ClassDef, name: Symbol) -> VmError {
        let msg = format!("Call to undefined method {}::{}()", self.class_name(class), self.sym_text(name));
        self.throw_error(b"Error", msg)
    }

    fn inaccessible_method(&mut self, entry: &MethodEntry, class: &ClassDef, name: Symbol) -> VmError {
        let declaring = match self.program.class(entry.scope) {
            Some(c) => self.class_name(c),
            None => self.class_name(class),
        };
        let msg = self.access_error_message(MemberKind::Method, entry.visibility, &declaring, &self.sym_text(name));
        self.throw_error(b"Error", msg)
    }

    fn abstract_call(&mut self, entry: &MethodEntry, name: Symbol) -> VmError {
        let class = match self.program.class(entry.scope) {
            Some(c) => self.class_name(c),
            None => self.sym_text(entry.scope),
        };
        let msg = format!("Cannot call abstract method {}::{}()", class, self.sym_text(name));
        self.throw_error(b"Error", msg)
    }

    /// `__call` redirect for an object, if the class has one.
    fn magic_instance_call(&self, obj: &ObjectRef, name: Symbol) -> Option<PendingCall> {
        let entry = obj.class().find_method(self.program.sym.call)?.clone();
        let mut call = PendingCall::new(self.method_callee(&entry, Some(obj.clone()), obj.class().clone()));
        call.magic = Some(Val::string(self.program.interner.text(name).to_vec()));
        Some(call)
    }

    fn magic_static_call(&self, class: &Rc<ClassDef>, name: Symbol) -> Option<PendingCall> {
        let entry = class.find_method(self.program.sym.call_static)?.clone();
        let mut call = PendingCall::new(self.method_callee(&entry, None, class.clone()));
        call.magic = Some(Val::string(self.program.interner.text(name).to_vec()));
        Some(call)
    }

    /// Pending call of `$obj->name(...)`.
    pub(crate) fn method_call(&mut self, obj: &ObjectRef, name: Symbol) -> Result<PendingCall, VmError> {
        let lname = self.lower(name);
        let class = obj.class().clone();
        match self.lookup_method(&class, lname) {
            MethodLookup::Found(entry) => {
                if entry.is_abstract {
                    return Err(self.abstract_call(&entry, name));
                }
                Ok(PendingCall::new(self.method_callee(&entry, Some(obj.clone()), class)))
            }
            MethodLookup::Inaccessible(entry) => match self.magic_instance_call(obj, name) {
                Some(call) => Ok(call),
                None => Err(self.inaccessible_method(&entry, &class, name)),
            },
            MethodLookup::Missing => match self.magic_instance_call(obj, name) {
                Some(call) => Ok(call),
                None => Err(self.undefined_method(&class, name)),
            },
        }
    }

    /// Pending call of `Class::name(...)`. `forwarding` is set for
    /// `self::`/`parent::`/`static::`, which keep the called class.
    pub(crate) fn static_call(
        &mut self,
        class: &Rc<ClassDef>,
        name: Symbol,
        forwarding: bool,
    ) -> Result<PendingCall, VmError> {
        let lname = self.lower(name);
        let this = self.current_this().filter(|t| t.class().is_a(class.lname));
        let static_class = if forwarding {
            self.frames
                .last()
                .and_then(|f| f.static_class.clone())
                .filter(|s| s.is_a(class.lname))
                .unwrap_or_else(|| class.clone())
        } else {
            class.clone()
        };
        match self.lookup_method(class, lname) {
            MethodLookup::Found(entry) => {
                if entry.is_abstract {
                    return Err(self.abstract_call(&entry, name));
                }
                if entry.is_static {
                    return Ok(PendingCall::new(self.method_callee(&entry, None, static_class)));
                }
                match this {
                    Some(this) => {
                        let this_class = this.class().clone();
                        Ok(PendingCall::new(self.method_callee(&entry, Some(this), this_class)))
                    }
                    None => {
                        let msg = format!(
                            "Non-static method {}::{}() cannot be called statically",
                            self.class_name(class),
                            self.sym_text(name)
                        );
                        Err(self.throw_error(b"Error", msg))
                    }
                }
            }
            lookup => {
                let magic = match &this {
                    Some(this) => self.magic_instance_call(this, name),
                    None => None,
                }
                .or_else(|| self.magic_static_call(class, name));
                match (magic, lookup) {
                    (Some(call), _) => Ok(call),
                    (None, MethodLookup::Inaccessible(entry)) => Err(self.inaccessible_method(&entry, class, name)),
                    (None, _) => Err(self.undefined_method(class, name)),
                }
            }
        }
    }

    // ---- Init* instructions ------------------------------------------------

    fn push_call(&mut self, call: PendingCall) -> Result<(), VmError> {
        self.frame_mut()?.calls.push(call);
        Ok(())
    }

    /// `InitFcall`
    pub(crate) fn init_fcall(&mut self, name: Symbol, lname: Symbol) -> Result<(), VmError> {
        let callee = match self.program.functions.get(&lname) {
            Some(func) => self.function_callee(func),
            None => {
                let text = self.program.interner.text(lname).to_vec();
                match self.find_function(&text) {
                    Some(callee) => callee,
                    None => {
                        let msg = format!("Call to undefined function {}()", self.sym_text(name));
                        return Err(self.throw_error(b"Error", msg));
                    }
                }
            }
        };
        self.push_call(PendingCall::new(callee))
    }

    /// `InitMethodCall`
    pub(crate) fn init_method_call(&mut self, target: Val, name: Symbol) -> Result<(), VmError> {
        let Val::Object(obj) = target else {
            let msg = format!(
                "Call to a member function {}() on {}",
                self.sym_text(name),
                target.type_name()
            );
            return Err(self.throw_error(b"Error", msg));
        };
        let call = self.method_call(&obj, name)?;
        self.push_call(call)
    }

    /// `InitStaticCall`
    pub(crate) fn init_static_call(&mut self, class_ref: ClassRef, name: Symbol) -> Result<(), VmError> {
        let forwarding = matches!(class_ref, ClassRef::SelfRef | ClassRef::Parent | ClassRef::Static);
        let class = self.resolve_class_ref(class_ref)?;
        let call = self.static_call(&class, name, forwarding)?;
        self.push_call(call)
    }

    /// `InitNew`: allocates the object, pushes it, and prepares the
    /// constructor call whose result is discarded.
    pub(crate) fn init_new(&mut self, class_ref: ClassRef) -> Result<(), VmError> {
        let class = self.resolve_class_ref(class_ref)?;
        self.check_instantiable(&class)?;
        let obj = self.instantiate(&class)?;
        self.push(Val::Object(obj.clone()))?;
        let construct = self.program.sym.construct;
        let callee = match class.find_method(construct).cloned() {
            Some(entry) => {
                let scope = self.current_scope();
                if !self.is_visible_from(entry.scope, entry.visibility, scope.as_deref()) {
                    let msg = format!(
                        "Call to {} {}::__construct() from {}",
                        entry.visibility.as_str(),
                        self.class_name(&class),
                        self.scope_description()
                    );
                    return Err(self.throw_error(b"Error", msg));
                }
                self.method_callee(&entry, Some(obj), class)
            }
            None => Callee::Noop,
        };
        let mut call = PendingCall::new(callee);
        call.discard = true;
        self.push_call(call)
    }

    pub(crate) fn check_instantiable(&mut self, class: &ClassDef) -> Result<(), VmError> {
        use crate::compiler::chunk::ClassKind;
        let name = self.class_name(class);
        let (error, msg) = match class.kind {
            ClassKind::Interface => (&b"InstantiationError"[..], format!("Cannot instantiate interface {}", name)),
            ClassKind::Trait => (&b"InstantiationError"[..], format!("Cannot instantiate trait {}", name)),
            ClassKind::Class if class.is_abstract => {
                (&b"InstantiationError"[..], format!("Cannot instantiate abstract class {}", name))
            }
            ClassKind::Class
                if class.lname == self.program.sym.closure || class.lname == self.program.sym.generator =>
            {
                (&b"Error"[..], format!("Instantiation of class {} is not allowed", name))
            }
            ClassKind::Class => return Ok(()),
        };
        Err(self.throw_error(error, msg))
    }

    // ---- Send* instructions ----------------------------------------------

    fn current_call(&mut self) -> Result<&mut PendingCall, VmError> {
        self.frame_mut()?
            .calls
            .last_mut()
            .ok_or_else(|| VmError::Fatal("Argument without a call".into()))
    }

    /// `SendVal`
    pub(crate) fn send_val(&mut self, val: Val) -> Result<(), VmError> {
        let val = val.into_deref();
        let call = self.current_call()?;
        if !call.named.is_empty() {
            return Err(self.throw_error(b"Error", "Cannot use positional argument after named argument"));
        }
        call.args.push(val);
        Ok(())
    }

    /// Whether the next positional argument of the innermost pending call
    /// is passed by reference.
    pub(crate) fn next_arg_by_ref(&mut self) -> Result<bool, VmError> {
        let call = self.current_call()?;
        let index = call.args.len();
        Ok(call.callee.arg_by_ref(index))
    }

    /// `SendUnpack`: `f(...$args)`
    pub(crate) fn send_unpack(&mut self, val: Val) -> Result<(), VmError> {
        let pairs: Vec<(Val, Val)> = match &val {
            Val::Array(arr) => arr.map.iter().map(|(k, v)| (k.to_val(), v.clone())).collect(),
            Val::Object(obj) if obj.class().is_a(self.program.sym.traversable) => self.iterate_object(obj)?,
            other => {
                let ty = self.debug_type(other);
                return Err(self.type_error(format!("Only arrays and Traversables can be unpacked, {} given", ty)));
            }
        };
        for (key, value) in pairs {
            match key {
                Val::String(name) => {
                    let name = self.program.interner.intern(&name);
                    let value = value.into_deref();
                    self.current_call()?.named.push((name, value));
                }
                _ => {
                    let call = self.current_call()?;
                    if !call.named.is_empty() {
                        return Err(self.throw_error(
                            b"Error",
                            "Cannot use positional argument after named argument during unpacking",
                        ));
                    }
                    let index = call.args.len();
                    let value = if call.callee.arg_by_ref(index) {
                        value
                    } else {
                        value.into_deref()
                    };
                    call.args.push(value);
                }
            }
        }
        Ok(())
    }

    /// `DoCall`
    pub(crate) fn do_call(&mut self) -> Result<(), VmError> {
        let call = self
            .frame_mut()?
            .calls
            .pop()
            .ok_or_else(|| VmError::Fatal("DoCall without a pending call".into()))?;
        let discard = call.discard;
        match self.prepare_call(call)? {
            Prepared::Frame(mut frame) => {
                frame.discard = discard;
                self.push_frame(frame)
            }
            Prepared::Done(val) => {
                if !discard {
                    self.push(val)?;
                }
                Ok(())
            }
        }
    }

    // ---- binding -----------------------------------------------------------

    /// Binds arguments and either builds the callee frame or runs the builtin.
    pub(crate) fn prepare_call(&mut self, call: PendingCall) -> Result<Prepared, VmError> {
        let PendingCall {
            callee,
            mut args,
            mut named,
            magic,
            ..
        } = call;
        if let Some(method) = magic {
            let mut packed = ArrayData::from(args.drain(..).map(Val::into_deref).collect::<Vec<_>>());
            for (name, value) in named.drain(..) {
                let key = ArrayKey::Str(Rc::new(self.program.interner.text(name).to_vec()));
                packed.insert(key, value);
            }
            args.push(method);
            args.push(Val::Array(Rc::new(packed)));
        }
        match callee {
            Callee::Noop => Ok(Prepared::Done(Val::Null)),
            Callee::Native(native) => {
                let mut args: Vec<Val> = args.into_iter().chain(named.into_iter().map(|(_, v)| v)).collect();
                let result = (native.handler)(self, &mut args)?;
                Ok(Prepared::Done(result))
            }
            Callee::NativeMethod { handler, this } => {
                let mut args: Vec<Val> = args.into_iter().chain(named.into_iter().map(|(_, v)| v)).collect();
                let result = handler(self, this.as_ref(), &mut args)?;
                Ok(Prepared::Done(result))
            }
            Callee::User {
                func,
                this,
                scope,
                static_class,
                captures,
            } => {
                let mut frame = Frame::new(func.clone());
                frame.this = this;
                frame.scope = scope;
                frame.static_class = static_class;
                self.bind_args(&mut frame, args, named)?;
                if let Some(captures) = captures {
                    for (capture, value) in func.uses.iter().zip(captures.iter()) {
                        let cell = match value {
                            Val::Ref(cell) => cell.clone(),
                            other => Reference::new(other.clone()),
                        };
                        if let Some(local) = frame.locals.get_mut(capture.slot as usize) {
                            *local = cell;
                        }
                    }
                }
                if func.is_generator {
                    let generator = self.create_generator(frame)?;
                    return Ok(Prepared::Done(Val::Object(generator)));
                }
                Ok(Prepared::Frame(frame))
            }
        }
    }

    fn bind_args(&mut self, frame: &mut Frame, args: ArgList, named: Vec<(Symbol, Val)>) -> Result<(), VmError> {
        let func = frame.func.clone();
        let variadic = func.params.last().is_some_and(|p| p.is_variadic);
        let fixed = if variadic { func.params.len() - 1 } else { func.params.len() };
        let passed = args.len();
        let any_named = !named.is_empty();
        let mut bound = vec![false; fixed];
        let mut extra = ArrayData::new();
        let caller_strict = self.strict_types();
        let type_scope = TypeScope {
            scope: frame.scope.clone(),
            static_class: frame.static_class.clone(),
        };

        for (index, arg) in args.into_iter().enumerate() {
            frame.args.push(arg.deref_clone());
            if index < fixed {
                bound[index] = true;
                self.bind_param(frame, index, arg, caller_strict, &type_scope)?;
            } else if variadic {
                let arg = self.check_variadic(&func, index, arg, caller_strict, &type_scope)?;
                extra.push(arg);
            }
        }

        for (name, value) in named {
            match func.params[..fixed].iter().position(|p| p.name == name) {
                Some(index) => {
                    if bound[index] {
                        let msg = format!("Named parameter ${} overwrites previous argument", self.sym_text(name));
                        return Err(self.throw_error(b"Error", msg));
                    }
                    bound[index] = true;
                    self.bind_param(frame, index, value, caller_strict, &type_scope)?;
                }
                None if variadic => {
                    let key = ArrayKey::Str(Rc::new(self.program.interner.text(name).to_vec()));
                    if extra.contains_key(&key) {
                        let msg = format!("Named parameter ${} overwrites previous argument", self.sym_text(name));
                        return Err(self.throw_error(b"Error", msg));
                    }
                    extra.insert_raw(key, value);
                }
                None => {
                    let msg = format!("Unknown named parameter ${}", self.sym_text(name));
                    return Err(self.throw_error(b"Error", msg));
                }
            }
        }

        for (index, param) in func.params[..fixed].iter().enumerate() {
            if bound[index] {
                continue;
            }
            match &param.default {
                Some(DefaultValue::Const(val)) => frame.locals[index].set(val.clone()),
                Some(DefaultValue::Expr) => {}
                None => return Err(self.missing_argument(&func, index, passed, any_named)),
            }
        }

        if variadic && let Some(cell) = frame.locals.get(fixed) {
            cell.set(Val::Array(Rc::new(extra)));
        }
        Ok(())
    }

    fn bind_param(
        &mut self,
        frame: &mut Frame,
        index: usize,
        arg: Val,
        strict: bool,
        scope: &TypeScope,
    ) -> Result<(), VmError> {
        let func = frame.func.clone();
        let param = &func.params[index];
        match arg {
            Val::Ref(cell) if param.by_ref => {
                if param.param_type.is_some() {
                    let current = cell.get();
                    if !current.is_null() {
                        let checked = self.check_param_type(&func, index, current, strict, scope)?;
                        cell.set(checked);
                    }
                }
                frame.locals[index] = cell;
            }
            other => {
                let value = self.check_param_type(&func, index, other.into_deref(), strict, scope)?;
                frame.locals[index].set(value);
            }
        }
        Ok(())
    }

    fn check_variadic(
        &mut self,
        func: &Rc<UserFunc>,
        index: usize,
        arg: Val,
        strict: bool,
        scope: &TypeScope,
    ) -> Result<Val, VmError> {
        let last = func.params.len() - 1;
        if func.params[last].by_ref {
            return Ok(arg);
        }
        let value = arg.into_deref();
        if func.params[last].param_type.is_none() {
            return Ok(value);
        }
        self.check_param_type_at(func, last, index, value, strict, scope)
    }

    fn check_param_type(
        &mut self,
        func: &Rc<UserFunc>,
        index: usize,
        value: Val,
        strict: bool,
        scope: &TypeScope,
    ) -> Result<Val, VmError> {
        self.check_param_type_at(func, index, index, value, strict, scope)
    }

    /// Checks an argument against the type of parameter `param`; `position`
    /// is the argument number shown in the error.
    fn check_param_type_at(
        &mut self,
        func: &Rc<UserFunc>,
        param: usize,
        position: usize,
        value: Val,
        strict: bool,
        scope: &TypeScope,
    ) -> Result<Val, VmError> {
        let info = &func.params[param];
        let Some(hint) = &info.param_type else {
            return Ok(value);
        };
        if value.is_null() && matches!(&info.default, Some(DefaultValue::Const(Val::Null))) {
            return Ok(Val::Null);
        }
        match self.coerce_to_type(value.clone(), hint, strict, scope)? {
            Some(coerced) => Ok(coerced),
            None => {
                let msg = format!(
                    "{}(): Argument #{} (${}) must be of type {}, {} given, called in {} on line {}",
                    self.sym_text(func.name),
                    position + 1,
                    self.sym_text(info.name),
                    self.type_hint_display(hint),
                    self.debug_type(&value),
                    String::from_utf8_lossy(&self.program.file_name),
                    self.current_line()
                );
                Err(self.type_error(msg))
            }
        }
    }

    fn missing_argument(&mut self, func: &UserFunc, index: usize, passed: usize, named: bool) -> VmError {
        if named {
            let msg = format!(
                "{}(): Argument #{} (${}) not passed",
                self.sym_text(func.name),
                index + 1,
                self.sym_text(func.params[index].name)
            );
            return self.throw_error(b"ArgumentCountError", msg);
        }
        let required = func.required_params();
        let exact = required == func.params.len();
        let msg = format!(
            "Too few arguments to function {}(), {} passed in {} on line {} and {} {} expected",
            self.sym_text(func.name),
            passed,
            String::from_utf8_lossy(&self.program.file_name),
            self.current_line(),
            if exact { "exactly" } else { "at least" },
            required
        );
        self.throw_error(b"ArgumentCountError", msg)
    }

    // ---- calling from native code ------------------------------------------

    /// Runs a prepared call to completion and returns its result.
    pub fn call_pending(&mut self, call: PendingCall) -> Result<Val, VmError> {
        self.call_pending_with(call, |_| {})
    }

    /// Like [`VM::call_pending`], with a hook to adjust the callee frame.
    pub(crate) fn call_pending_with(
        &mut self,
        call: PendingCall,
        setup: impl FnOnce(&mut Frame),
    ) -> Result<Val, VmError> {
        match self.prepare_call(call)? {
            Prepared::Done(val) => Ok(val),
            Prepared::Frame(mut frame) => {
                setup(&mut frame);
                let base = self.frames.len();
                self.push_frame(frame)?;
                self.run_frames(base)
            }
        }
    }

    /// Calls any PHP callable value with positional arguments.
    pub fn call_value(&mut self, callable: &Val, args: Vec<Val>) -> Result<Val, VmError> {
        let mut call = self.callable_to_call(callable)?;
        call.args.extend(args);
        self.call_pending(call)
    }

    /// Calls a method by name on an object, as engine-internal code does
    /// for interface methods (`current`, `offsetGet`, `count`, ...).
    pub fn call_method(&mut self, obj: &ObjectRef, name: &[u8], args: Vec<Val>) -> Result<Val, VmError> {
        let name = self.program.interner.intern(name);
        let mut call = self.method_call(obj, name)?;
        call.args.extend(args);
        self.call_pending(call)
    }

    pub(crate) fn call_method_entry(
        &mut self,
        this: Option<ObjectRef>,
        class: Rc<ClassDef>,
        entry: &MethodEntry,
        args: Vec<Val>,
    ) -> Result<Val, VmError> {
        let mut call = PendingCall::new(self.method_callee(entry, this, class));
        call.args.extend(args);
        self.call_pending(call)
    }

    // ---- callable values ---------------------------------------------------

    /// Pending call for a callable value; throws when it is not callable.
    pub(crate) fn callable_to_call(&mut self, callable: &Val) -> Result<PendingCall, VmError> {
        match self.resolve_callable(callable, true)? {
            Some(call) => Ok(call),
            None => Err(self.throw_error(b"Error", "Value not callable")),
        }
    }

    pub fn is_callable(&mut self, val: &Val) -> bool {
        matches!(self.resolve_callable(val, false), Ok(Some(_)))
    }

    /// Resolves a callable value. With `report` unset nothing is thrown and
    /// unresolvable values yield `None`.
    pub(crate) fn resolve_callable(&mut self, callable: &Val, report: bool) -> Result<Option<PendingCall>, VmError> {
        match callable {
            Val::Ref(r) => {
                let inner = r.get();
                self.resolve_callable(&inner, report)
            }
            Val::Object(obj) => {
                if let Some(state) = obj.internal::<ClosureState>() {
                    let mut call = PendingCall::new(state.callee.clone());
                    call.magic = state.magic.clone();
                    return Ok(Some(call));
                }
                let invoke = self.program.sym.invoke;
                match obj.class().find_method(invoke).cloned() {
                    Some(entry) => Ok(Some(PendingCall::new(self.method_callee(
                        &entry,
                        Some(obj.clone()),
                        obj.class().clone(),
                    )))),
                    None if report => {
                        let msg = format!("Object of type {} is not callable", self.class_name(obj.class()));
                        Err(self.throw_error(b"Error", msg))
                    }
                    None => Ok(None),
                }
            }
            Val::String(name) => {
                if let Some(at) = name.windows(2).position(|w| w == b"::") {
                    let class = name[..at].to_vec();
                    let method = name[at + 2..].to_vec();
                    return self.resolve_static_callable(&class, &method, report);
                }
                match self.find_function(name) {
                    Some(callee) => Ok(Some(PendingCall::new(callee))),
                    None if report => {
                        let msg = format!("Call to undefined function {}()", String::from_utf8_lossy(name));
                        Err(self.throw_error(b"Error", msg))
                    }
                    None => Ok(None),
                }
            }
            Val::Array(arr) if arr.len() == 2 => {
                let (Some(target), Some(Val::String(method))) =
                    (arr.get(&ArrayKey::Int(0)), arr.get(&ArrayKey::Int(1)))
                else {
                    return self.not_callable(report);
                };
                match target {
                    Val::Object(obj) => {
                        let name = self.program.interner.intern(&method);
                        if report {
                            return self.method_call(&obj, name).map(Some);
                        }
                        let lname = self.lower(name);
                        match self.lookup_method(obj.class(), lname) {
                            MethodLookup::Found(entry) if !entry.is_abstract => Ok(Some(PendingCall::new(
                                self.method_callee(&entry, Some(obj.clone()), obj.class().clone()),
                            ))),
                            _ => Ok(self.magic_instance_call(&obj, name)),
                        }
                    }
                    Val::String(class) => self.resolve_static_callable(&class, &method, report),
                    _ => self.not_callable(report),
                }
            }
            _ => self.not_callable(report),
        }
    }

    fn not_callable(&mut self, report: bool) -> Result<Option<PendingCall>, VmError> {
        if report {
            Err(self.throw_error(b"Error", "Array callback must have exactly two elements"))
        } else {
            Ok(None)
        }
    }

    fn resolve_static_callable(
        &mut self,
        class: &[u8],
        method: &[u8],
        report: bool,
    ) -> Result<Option<PendingCall>, VmError> {
        let class_name = class;
        let (class, forwarding) = match class_name.to_ascii_lowercase().as_slice() {
            b"self" => (self.current_scope(), true),
            b"static" => (self.frames.last().and_then(|f| f.static_class.clone()), true),
            b"parent" => (self.current_scope().and_then(|s| s.parent.clone()), true),
            _ => (self.program.find_class(class_name).cloned(), false),
        };
        let Some(class) = class else {
            if report {
                let shown = String::from_utf8_lossy(class_name).into_owned();
                return Err(self.throw_error(b"Error", format!("Class \"{}\" not found", shown)));
            }
            return Ok(None);
        };
        let name = self.program.interner.intern(method);
        if report {
            return self.static_call(&class, name, forwarding).map(Some);
        }
        let lname = self.lower(name);
        match self.lookup_method(&class, lname) {
            MethodLookup::Found(entry) if !entry.is_abstract => {
                if entry.is_static {
                    return Ok(Some(PendingCall::new(self.method_callee(&entry, None, class))));
                }
                let this = self.current_this().filter(|t| t.class().is_a(class.lname));
                Ok(this.map(|this| {
                    let this_class = this.class().clone();
                    PendingCall::new(self.method_callee(&entry, Some(this), this_class))
                }))
            }
            _ => Ok(self.magic_static_call(&class, name)),
        }
    }

    // ---- closures ----------------------------------------------------------

    /// Wraps a callee in a new `Closure` object.
    pub(crate) fn new_closure(&mut self, callee: Callee, magic: Option<Val>) -> Result<ObjectRef, VmError> {
        let class = self
            .program
            .class(self.program.sym.closure)
            .cloned()
            .ok_or_else(|| VmError::Fatal("Closure is not registered".into()))?;
        let obj = self.instantiate(&class)?;
        obj.set_internal(Rc::new(ClosureState { callee, magic }));
        Ok(obj)
    }

    /// `MakeClosure`: `function () use (...) {}` and arrow functions.
    pub(crate) fn make_closure(&mut self, func_idx: u32, captures: u16) -> Result<(), VmError> {
        let values = self.pop_n(captures as usize)?;
        let frame = self.frame()?;
        let func = frame
            .chunk
            .functions
            .get(func_idx as usize)
            .cloned()
            .ok_or_else(|| VmError::Fatal("Closure body out of range".into()))?;
        let this = if func.is_static { None } else { frame.this.clone() };
        let scope = frame.scope.clone();
        let static_class = match &this {
            Some(this) => Some(this.class().clone()),
            None => frame.static_class.clone(),
        };
        let callee = Callee::User {
            func,
            this,
            scope,
            static_class,
            captures: Some(values.into()),
        };
        let closure = self.new_closure(callee, None)?;
        self.push(Val::Object(closure))
    }

    /// `MakeCallableClosure`: first-class callable syntax `f(...)`.
    pub(crate) fn closure_from_call(&mut self, call: PendingCall) -> Result<ObjectRef, VmError> {
        self.new_closure(call.callee, call.magic)
    }
}
