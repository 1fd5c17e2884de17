//! Visibility checking and access control
//!
//! Implements PHP visibility rules for class members (properties, methods, constants).
//! Following Zend engine semantics for public, protected, and private access.
//!
//! ## PHP Visibility Rules
//!
//! - **Public**: Accessible from anywhere
//! - **Protected**: Accessible from any class in the same hierarchy as the
//!   root declaration of the member
//! - **Private**: Accessible only from the declaring class
//!
//! ## References
//!
//! - Zend: `$PHP_SRC_PATH/Zend/zend_object_handlers.c` - zend_check_protected
//! - PHP Manual: https://www.php.net/manual/en/language.oop5.visibility.php

use crate::core::value::{Symbol, Visibility};
use crate::runtime::context::ClassDef;
use crate::vm::engine::VM;
use std::rc::Rc;

/// Member kind used in access error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Method,
    Property,
    Constant,
}

impl VM {
    /// Whether code running in `scope` may access a member with
    /// `visibility` declared in `declaring` (lowercased).
    pub(crate) fn is_visible_from(
        &self,
        declaring: Symbol,
        visibility: Visibility,
        scope: Option<&ClassDef>,
    ) -> bool {
        match visibility {
            Visibility::Public => true,
            Visibility::Private => scope.is_some_and(|s| s.lname == declaring),
            Visibility::Protected => {
                let Some(scope) = scope else { return false };
                if scope.is_a(declaring) {
                    return true;
                }
                self.program
                    .class(declaring)
                    .is_some_and(|d| d.is_a(scope.lname))
            }
        }
    }

    /// Protected methods are checked against the topmost class declaring
    /// them, so siblings overriding the same method can call each other.
    pub(crate) fn method_visible_from(
        &self,
        class: &Rc<ClassDef>,
        lname: Symbol,
        visibility: Visibility,
        declaring: Symbol,
        scope: Option<&ClassDef>,
    ) -> bool {
        if visibility != Visibility::Protected {
            return self.is_visible_from(declaring, visibility, scope);
        }
        let mut root = declaring;
        let mut current = Some(class.clone());
        while let Some(c) = current {
            if c.methods.get(&lname).is_some_and(|m| m.visibility != Visibility::Private) {
                root = c.lname;
            }
            current = c.parent.clone();
        }
        self.is_visible_from(root, visibility, scope) || self.is_visible_from(declaring, visibility, scope)
    }

    /// "from scope X" / "from global scope" suffix of access errors.
    pub(crate) fn scope_description(&self) -> String {
        match self.current_scope() {
            Some(scope) => format!("scope {}", self.class_name(&scope)),
            None => "global scope".to_string(),
        }
    }

    pub(crate) fn access_error_message(
        &self,
        kind: MemberKind,
        visibility: Visibility,
        class: &str,
        member: &str,
    ) -> String {
        match kind {
            MemberKind::Method => format!(
                "Call to {} method {}::{}() from {}",
                visibility.as_str(),
                class,
                member,
                self.scope_description()
            ),
            MemberKind::Property => format!(
                "Cannot access {} property {}::${}",
                visibility.as_str(),
                class,
                member
            ),
            MemberKind::Constant => format!(
                "Cannot access {} constant {}::{}",
                visibility.as_str(),
                class,
                member
            ),
        }
    }
}
