use crate::core::value::Symbol;
use std::borrow::Cow;
use std::collections::HashMap;

/// Owns the text of every identifier the compiler and VM refer to by `Symbol`.
#[derive(Debug, Default, Clone)]
pub struct Interner {
    map: HashMap<Vec<u8>, Symbol>,
    vec: Vec<Vec<u8>>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &[u8]) -> Symbol {
        if let Some(&sym) = self.map.get(s) {
            return sym;
        }
        let sym = Symbol(self.vec.len() as u32);
        self.vec.push(s.to_vec());
        self.map.insert(s.to_vec(), sym);
        sym
    }

    /// Interns the ASCII-lowercased form, used for class and function keys.
    pub fn intern_lower(&mut self, s: &[u8]) -> Symbol {
        if s.iter().any(u8::is_ascii_uppercase) {
            let lower = s.to_ascii_lowercase();
            self.intern(&lower)
        } else {
            self.intern(s)
        }
    }

    pub fn find(&self, s: &[u8]) -> Option<Symbol> {
        self.map.get(s).copied()
    }

    pub fn find_lower(&self, s: &[u8]) -> Option<Symbol> {
        if s.iter().any(u8::is_ascii_uppercase) {
            self.find(&s.to_ascii_lowercase())
        } else {
            self.find(s)
        }
    }

    pub fn lookup(&self, sym: Symbol) -> Option<&[u8]> {
        self.vec.get(sym.0 as usize).map(|v| v.as_slice())
    }

    /// Symbol text, empty for unknown symbols.
    pub fn text(&self, sym: Symbol) -> &[u8] {
        self.lookup(sym).unwrap_or(b"")
    }

    pub fn display(&self, sym: Symbol) -> Cow<'_, str> {
        String::from_utf8_lossy(self.text(sym))
    }

    pub fn len(&self) -> usize {
        self.vec.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intern_is_stable() {
        let mut interner = Interner::new();
        let a = interner.intern(b"foo");
        let b = interner.intern(b"foo");
        assert_eq!(a, b);
        assert_eq!(interner.text(a), b"foo");
    }

    #[test]
    fn lowercase_keys_fold_case() {
        let mut interner = Interner::new();
        let upper = interner.intern_lower(b"MyClass");
        let lower = interner.intern(b"myclass");
        assert_eq!(upper, lower);
        assert_eq!(interner.find_lower(b"MYCLASS"), Some(lower));
        assert_eq!(interner.find(b"MyClass"), None);
    }
}
