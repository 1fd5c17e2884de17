//! Human-readable listing of compiled bytecode, used by `dump_bytecode`.

use super::chunk::{ClassDecl, ConstInit, UserFunc};
use crate::core::interner::Interner;
use std::fmt::Write;

/// Lists `func` followed by every function and class body nested in it.
pub fn disassemble(interner: &Interner, func: &UserFunc) -> String {
    let mut out = String::new();
    write_function(&mut out, interner, func);
    out
}

fn write_function(out: &mut String, interner: &Interner, func: &UserFunc) {
    let chunk = &func.chunk;
    let _ = writeln!(out, "=== {} ===", interner.display(func.name));
    if !func.params.is_empty() {
        let params: Vec<String> = func
            .params
            .iter()
            .map(|p| {
                let mut text = String::new();
                if p.by_ref {
                    text.push('&');
                }
                if p.is_variadic {
                    text.push_str("...");
                }
                text.push('$');
                text.push_str(&interner.display(p.name));
                if p.default.is_some() {
                    text.push_str(" = ?");
                }
                text
            })
            .collect();
        let _ = writeln!(out, "params: {}", params.join(", "));
    }
    let flags: Vec<&str> = [
        (func.is_generator, "generator"),
        (func.is_static, "static"),
        (func.returns_ref, "by-ref"),
        (chunk.strict_types, "strict_types"),
    ]
    .iter()
    .filter(|(set, _)| *set)
    .map(|(_, name)| *name)
    .collect();
    if !flags.is_empty() {
        let _ = writeln!(out, "flags: {}", flags.join(" "));
    }

    let _ = writeln!(out, "--- Bytecode ---");
    for (i, op) in chunk.code.iter().enumerate() {
        let _ = writeln!(out, "{:4} L{:<4} {:?}", i, chunk.line_at(i), op);
    }

    if !chunk.constants.is_empty() {
        let _ = writeln!(out, "--- Constants ---");
        for (i, val) in chunk.constants.iter().enumerate() {
            let _ = writeln!(out, "{:4}: {:?}", i, val);
        }
    }

    let locals: Vec<String> = chunk
        .local_names
        .iter()
        .enumerate()
        .map(|(i, name)| match name {
            Some(sym) => format!("{}:${}", i, interner.display(*sym)),
            None => format!("{}:~tmp", i),
        })
        .collect();
    if !locals.is_empty() {
        let _ = writeln!(out, "--- Locals ---");
        let _ = writeln!(out, "{}", locals.join(" "));
    }

    if !chunk.try_regions.is_empty() {
        let _ = writeln!(out, "--- Try Regions ---");
        for (i, region) in chunk.try_regions.iter().enumerate() {
            let _ = write!(
                out,
                "{:4}: try [{}, {}) catch-end {}",
                i, region.start, region.try_end, region.protected_end
            );
            for handler in &region.catches {
                let types: Vec<_> = handler.types.iter().map(|t| interner.display(*t)).collect();
                let _ = write!(out, " catch({}) -> {}", types.join("|"), handler.target);
            }
            if let Some(finally) = region.finally {
                let _ = write!(out, " finally [{}, {})", finally, region.finally_end);
            }
            let _ = writeln!(out);
        }
    }
    let _ = writeln!(out);

    for nested in &chunk.functions {
        write_function(out, interner, nested);
    }
    for class in &chunk.classes {
        write_class(out, interner, class);
    }
}

fn write_class(out: &mut String, interner: &Interner, class: &ClassDecl) {
    for constant in &class.constants {
        if let ConstInit::Thunk(func) = &constant.value {
            write_function(out, interner, func);
        }
    }
    for prop in &class.properties {
        if let Some(ConstInit::Thunk(func)) = &prop.default {
            write_function(out, interner, func);
        }
        if let Some(hooks) = &prop.hooks {
            for func in hooks.get.iter().chain(hooks.set.iter()) {
                write_function(out, interner, func);
            }
        }
    }
    for method in &class.methods {
        write_function(out, interner, &method.func);
    }
}
