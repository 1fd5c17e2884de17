//! Bytecode compiler.
//!
//! [`compile_into`] lowers a parsed file into a `{main}` function, registers
//! the functions declared at the top level and links every top-level class
//! whose parent, interfaces and traits are already known. Classes that
//! depend on something declared later are linked by their `DeclareClass`
//! instruction when execution reaches it.

pub mod chunk;
mod class;
pub mod constant;
pub mod disasm;
pub mod emitter;
pub mod error;
mod expr;
pub mod linker;
mod walk;

use crate::parser::ast;
use crate::runtime::context::Program;
use chunk::UserFunc;
use emitter::{CompileUnit, Emitter};
use error::{CompileError, SourcePos};
use linker::LinkError;
use std::rc::Rc;
use tracing::{debug, trace};

/// Compiles `ast` and installs its hoisted declarations in `program`.
/// The returned `{main}` function is also stored as `program.main`.
pub fn compile_into(
    program: &mut Program,
    source: &[u8],
    ast: &ast::Program<'_>,
) -> Result<Rc<UserFunc>, CompileError> {
    let file_name = program.file_name.clone();
    let (main, functions, classes) = {
        let mut unit = CompileUnit::new(source, &file_name, &mut program.interner);
        unit.strict_types = emitter::declares_strict_types(source, ast.statements);
        let main = Emitter::compile_main(&mut unit, ast.statements)?;
        let functions = std::mem::take(&mut unit.functions);
        let classes = std::mem::take(&mut unit.classes);
        (main, functions, classes)
    };
    debug!(
        functions = functions.len(),
        classes = classes.len(),
        ops = main.chunk.code.len(),
        "compiled file"
    );

    for (func, at) in functions {
        let text = program.interner.text(func.name).to_vec();
        let lname = program.interner.intern_lower(&text);
        if program.function_exists(lname) {
            return Err(CompileError::Duplicate {
                what: "function",
                name: format!("{}()", String::from_utf8_lossy(&text)),
                at,
            });
        }
        program.functions.insert(lname, func);
    }

    let mut pending = classes;
    loop {
        let mut progress = false;
        let mut postponed = Vec::new();
        for decl in pending {
            let text = program.interner.text(decl.name).to_vec();
            let lname = program.interner.intern_lower(&text);
            if program.classes.contains_key(&lname) {
                return Err(CompileError::Duplicate {
                    what: "class",
                    name: String::from_utf8_lossy(&text).into_owned(),
                    at: SourcePos {
                        line: decl.line,
                        column: decl.column,
                    },
                });
            }
            match linker::link_class(program, &decl) {
                Ok(class) => {
                    program.classes.insert(lname, class);
                    progress = true;
                }
                Err(LinkError::Missing { kind, name }) => {
                    trace!(%kind, %name, "class linking postponed");
                    postponed.push(decl);
                }
                Err(LinkError::Invalid(err)) => return Err(err),
            }
        }
        if postponed.is_empty() || !progress {
            break;
        }
        pending = postponed;
    }

    program.main = Some(main.clone());
    Ok(main)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser;
    use bumpalo::Bump;

    fn compile(source: &str) -> (Program, Result<Rc<UserFunc>, CompileError>) {
        let arena = Bump::new();
        let ast = parser::parse(source.as_bytes(), &arena);
        assert!(ast.errors.is_empty(), "parse errors: {:?}", ast.errors);
        let mut program = Program::new();
        let result = compile_into(&mut program, source.as_bytes(), &ast);
        (program, result)
    }

    #[test]
    fn hoisted_classes_link_in_any_order() {
        let (program, result) = compile("<?php class B extends A {} class A {}");
        assert!(result.is_ok());
        let b = program.find_class(b"b").expect("B linked");
        assert!(b.parent.is_some());
    }

    #[test]
    fn duplicate_function_is_rejected() {
        let (_, result) = compile("<?php function f() {} function F() {}");
        assert!(matches!(result, Err(CompileError::Duplicate { what: "function", .. })));
    }

    #[test]
    fn redeclaring_builtin_function_is_rejected() {
        let (_, result) = compile("<?php function strlen($s) { return 0; }");
        assert!(matches!(result, Err(CompileError::Duplicate { .. })));
    }

    #[test]
    fn trait_collision_is_a_compile_error() {
        let (_, result) = compile(
            "<?php trait A { function hello() {} } trait B { function hello() {} } class C { use A, B; }",
        );
        match result {
            Err(CompileError::TraitConflict { class, method, .. }) => {
                assert_eq!(class, "C");
                assert_eq!(method, "hello");
            }
            other => panic!("expected trait conflict, got {:?}", other),
        }
    }

    #[test]
    fn insteadof_resolves_collision() {
        let (program, result) = compile(
            "<?php trait A { function hello() {} } trait B { function hello() {} }
             class C { use A, B { A::hello insteadof B; B::hello as helloB; } }",
        );
        assert!(result.is_ok());
        let c = program.find_class(b"C").expect("C linked");
        assert_eq!(c.methods.len(), 2);
    }

    #[test]
    fn final_method_cannot_be_overridden() {
        let (_, result) =
            compile("<?php class A { final function f() {} } class B extends A { function f() {} }");
        match result {
            Err(CompileError::Inheritance { message, .. }) => {
                assert_eq!(message, "Cannot override final method A::f()");
            }
            other => panic!("expected inheritance error, got {:?}", other),
        }
    }

    #[test]
    fn missing_abstract_implementation_is_reported() {
        let (_, result) = compile("<?php interface I { function f(); } class C implements I {}");
        match result {
            Err(CompileError::Inheritance { message, .. }) => {
                assert!(message.starts_with("Class C contains 1 abstract method"), "{message}");
            }
            other => panic!("expected inheritance error, got {:?}", other),
        }
    }

    #[test]
    fn class_with_unknown_parent_is_left_for_runtime() {
        let (program, result) = compile("<?php if (true) { class P {} } class C extends P {}");
        assert!(result.is_ok());
        assert!(program.find_class(b"C").is_none());
    }
}
