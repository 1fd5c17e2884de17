//! Class and class member resolution
//!
//! Resolves the class operand of instructions (`Foo::`, `self::`,
//! `parent::`, `static::`, `$name::`), declares functions and classes at
//! runtime, and reads class constants and static properties.
//!
//! Constant expressions and static property defaults are evaluated on first
//! access, in the scope of the declaring class.
//!
//! Reference: $PHP_SRC_PATH/Zend/zend_execute.c - zend_fetch_class, zend_fetch_static_property_address
//! Reference: $PHP_SRC_PATH/Zend/zend_constants.c - zend_get_class_constant_ex

use crate::compiler::linker::{self, LinkError};
use crate::core::value::{Reference, Symbol, Val};
use crate::runtime::context::{ClassDef, StaticProp};
use crate::vm::engine::{VM, VmError};
use crate::vm::opcode::ClassRef;
use crate::vm::visibility::MemberKind;
use std::rc::Rc;
use tracing::debug;

impl VM {
    /// Class named by an instruction operand. `ClassRef::Dynamic` pops the
    /// class name or object from the operand stack.
    pub(crate) fn resolve_class_ref(&mut self, class: ClassRef) -> Result<Rc<ClassDef>, VmError> {
        match class {
            ClassRef::Named(name) => self.lookup_class(name),
            ClassRef::SelfRef => match self.current_scope() {
                Some(scope) => Ok(scope),
                None => Err(self.throw_error(b"Error", "Cannot use \"self\" when no class scope is active")),
            },
            ClassRef::Parent => match self.current_scope() {
                Some(scope) => match &scope.parent {
                    Some(parent) => Ok(parent.clone()),
                    None => Err(self.throw_error(
                        b"Error",
                        "Cannot use \"parent\" when current class scope has no parent",
                    )),
                },
                None => Err(self.throw_error(b"Error", "Cannot use \"parent\" when no class scope is active")),
            },
            ClassRef::Static => match self.frames.last().and_then(|f| f.static_class.clone()) {
                Some(class) => Ok(class),
                None => Err(self.throw_error(b"Error", "Cannot use \"static\" when no class scope is active")),
            },
            ClassRef::Dynamic => {
                let val = self.pop()?.into_deref();
                self.class_of_value(&val)
            }
        }
    }

    /// Class named by a string value, or the class of an object.
    pub(crate) fn class_of_value(&mut self, val: &Val) -> Result<Rc<ClassDef>, VmError> {
        match val {
            Val::Object(obj) => Ok(obj.class().clone()),
            Val::String(name) => self.lookup_class_bytes(name),
            _ => Err(self.throw_error(b"Error", "Cannot use value as class name")),
        }
    }

    pub(crate) fn lookup_class(&mut self, name: Symbol) -> Result<Rc<ClassDef>, VmError> {
        let lname = self.lower(name);
        if let Some(class) = self.program.class(lname) {
            return Ok(class.clone());
        }
        let shown = self.sym_text(name);
        Err(self.throw_error(b"Error", format!("Class \"{}\" not found", shown)))
    }

    pub(crate) fn lookup_class_bytes(&mut self, name: &[u8]) -> Result<Rc<ClassDef>, VmError> {
        if let Some(class) = self.program.find_class(name) {
            return Ok(class.clone());
        }
        let shown = String::from_utf8_lossy(name).into_owned();
        Err(self.throw_error(b"Error", format!("Class \"{}\" not found", shown)))
    }

    /// `$val instanceof Class`. An undeclared class matches nothing.
    pub(crate) fn op_instanceof(&mut self, class: ClassRef) -> Result<bool, VmError> {
        let target = match class {
            ClassRef::Named(name) => Some(self.lower(name)),
            ClassRef::Dynamic => {
                let class_val = self.pop()?.into_deref();
                match &class_val {
                    Val::Object(obj) => Some(obj.class().lname),
                    Val::String(name) => self.program.find_class(name).map(|c| c.lname),
                    _ => return Err(self.throw_error(b"Error", "Class name must be a valid object or a string")),
                }
            }
            other => Some(self.resolve_class_ref(other)?.lname),
        };
        let val = self.pop()?.into_deref();
        Ok(match (val, target) {
            (Val::Object(obj), Some(lname)) => obj.class().is_a(lname),
            _ => false,
        })
    }

    /// `DeclareClass`: links a class whose declaration was reached at
    /// runtime. Hoisted classes are already linked, which makes this a no-op.
    pub(crate) fn declare_class(&mut self, idx: u32) -> Result<(), VmError> {
        let decl = self
            .frame()?
            .chunk
            .classes
            .get(idx as usize)
            .cloned()
            .ok_or_else(|| VmError::Fatal("Class declaration out of range".into()))?;
        let lname = self.lower(decl.name);
        if let Some(existing) = self.program.class(lname) {
            if existing.decl.as_ref().is_some_and(|d| Rc::ptr_eq(d, &decl)) {
                return Ok(());
            }
            let shown = self.class_name(existing);
            return Err(VmError::Fatal(format!(
                "Cannot declare class {}, because the name is already in use",
                shown
            )));
        }
        match linker::link_class(&mut self.program, &decl) {
            Ok(class) => {
                debug!(class = %self.class_name(&class), "class declared at runtime");
                self.program.classes.insert(lname, class);
                Ok(())
            }
            Err(LinkError::Missing { kind, name }) => {
                Err(self.throw_error(b"Error", format!("{} \"{}\" not found", kind, name)))
            }
            Err(LinkError::Invalid(err)) => Err(VmError::Compile(err)),
        }
    }

    /// `DeclareFunction`: a function declared inside a block or function body.
    pub(crate) fn declare_function(&mut self, idx: u32) -> Result<(), VmError> {
        let func = self
            .frame()?
            .chunk
            .functions
            .get(idx as usize)
            .cloned()
            .ok_or_else(|| VmError::Fatal("Function declaration out of range".into()))?;
        let lname = self.lower(func.name);
        if self.program.function_exists(lname) {
            return Err(VmError::Fatal(format!(
                "Cannot redeclare function {}()",
                self.sym_text(func.name)
            )));
        }
        self.program.functions.insert(lname, func);
        Ok(())
    }

    /// `Class::NAME`
    pub(crate) fn class_constant(&mut self, class: &Rc<ClassDef>, name: Symbol) -> Result<Val, VmError> {
        let Some(constant) = class.constants.get(&name).cloned() else {
            if self.program.interner.text(name).eq_ignore_ascii_case(b"class") {
                return Ok(Val::string(self.program.interner.text(class.name).to_vec()));
            }
            let shown = format!("{}::{}", self.class_name(class), self.sym_text(name));
            return Err(self.throw_error(b"Error", format!("Undefined constant {}", shown)));
        };
        let scope = self.current_scope();
        if !self.is_visible_from(constant.declaring_class, constant.visibility, scope.as_deref()) {
            let class_name = self.class_name(class);
            let msg = self.access_error_message(
                MemberKind::Constant,
                constant.visibility,
                &class_name,
                &self.sym_text(name),
            );
            return Err(self.throw_error(b"Error", msg));
        }
        self.eval_const_init(&constant.init, &constant.cache, constant.declaring_class)
    }

    /// Declaration of a static property as seen from `class`.
    pub(crate) fn static_prop_info(&self, class: &ClassDef, name: Symbol) -> Option<Rc<StaticProp>> {
        class.static_props.get(&name).cloned()
    }

    /// Cell of `Class::$name`, initialized on first access. With `report`
    /// unset, undeclared or inaccessible properties yield `None`.
    pub(crate) fn find_static_prop(
        &mut self,
        class: &Rc<ClassDef>,
        name: Symbol,
        report: bool,
    ) -> Result<Option<Reference>, VmError> {
        let Some(prop) = self.static_prop_info(class, name) else {
            if !report {
                return Ok(None);
            }
            let shown = format!("{}::${}", self.class_name(class), self.sym_text(name));
            return Err(self.throw_error(b"Error", format!("Access to undeclared static property {}", shown)));
        };
        let scope = self.current_scope();
        if !self.is_visible_from(prop.declaring_class, prop.visibility, scope.as_deref()) {
            if !report {
                return Ok(None);
            }
            let class_name = self.class_name(class);
            let msg = self.access_error_message(
                MemberKind::Property,
                prop.visibility,
                &class_name,
                &self.sym_text(name),
            );
            return Err(self.throw_error(b"Error", msg));
        }
        if let Some(cell) = prop.cell.get() {
            return Ok(Some(cell.clone()));
        }
        let value = self.eval_const_init(&prop.init, &Default::default(), prop.declaring_class)?;
        let cell = prop.cell.get_or_init(|| Reference::new(value)).clone();
        Ok(Some(cell))
    }

    pub(crate) fn static_prop_cell(&mut self, class: &Rc<ClassDef>, name: Symbol) -> Result<Reference, VmError> {
        self.find_static_prop(class, name, true)?
            .ok_or_else(|| VmError::Fatal("Static property lookup failed".into()))
    }
}
