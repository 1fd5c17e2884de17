use crate::core::heap::ObjectStore;
use crate::runtime::context::ClassDef;
use indexmap::IndexMap;
use std::any::Any;
use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt::{self, Debug};
use std::rc::{Rc, Weak};

/// Ordered hash map backing PHP arrays.
#[derive(Debug, Clone, Default)]
pub struct ArrayData {
    pub map: IndexMap<ArrayKey, Val>,
    /// Next auto-increment index, never decreases
    pub next_free: i64,
}

impl ArrayData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: IndexMap::with_capacity(capacity),
            next_free: 0,
        }
    }

    /// Insert or replace; an existing reference slot is written through.
    pub fn insert(&mut self, key: ArrayKey, value: Val) {
        if let ArrayKey::Int(i) = &key
            && *i >= self.next_free
        {
            self.next_free = i.saturating_add(1);
        }
        match self.map.get_mut(&key) {
            Some(Val::Ref(cell)) if !matches!(value, Val::Ref(_)) => cell.set(value),
            Some(slot) => *slot = value,
            None => {
                self.map.insert(key, value);
            }
        }
    }

    /// Stores `value` in the slot as-is, replacing any reference binding.
    pub fn insert_raw(&mut self, key: ArrayKey, value: Val) {
        if let ArrayKey::Int(i) = &key
            && *i >= self.next_free
        {
            self.next_free = i.saturating_add(1);
        }
        self.map.insert(key, value);
    }

    pub fn next_index(&self) -> i64 {
        self.next_free
    }

    pub fn push(&mut self, value: Val) -> ArrayKey {
        let key = ArrayKey::Int(self.next_free);
        self.next_free = self.next_free.saturating_add(1);
        self.map.insert(key.clone(), value);
        key
    }

    /// Element value with references resolved.
    pub fn get(&self, key: &ArrayKey) -> Option<Val> {
        self.map.get(key).map(Val::deref_clone)
    }

    pub fn get_raw(&self, key: &ArrayKey) -> Option<&Val> {
        self.map.get(key)
    }

    pub fn contains_key(&self, key: &ArrayKey) -> bool {
        self.map.contains_key(key)
    }

    pub fn remove(&mut self, key: &ArrayKey) -> Option<Val> {
        self.map.shift_remove(key)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Key/value pairs with references resolved.
    pub fn iter(&self) -> impl Iterator<Item = (&ArrayKey, Val)> {
        self.map.iter().map(|(k, v)| (k, v.deref_clone()))
    }

    pub fn values(&self) -> impl Iterator<Item = Val> + '_ {
        self.map.values().map(Val::deref_clone)
    }

    pub fn is_list(&self) -> bool {
        self.map
            .keys()
            .enumerate()
            .all(|(i, k)| matches!(k, ArrayKey::Int(n) if *n == i as i64))
    }
}

impl From<Vec<Val>> for ArrayData {
    fn from(values: Vec<Val>) -> Self {
        let mut data = ArrayData::with_capacity(values.len());
        for value in values {
            data.push(value);
        }
        data
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Symbol(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
    Private,
}

impl Visibility {
    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Protected => "protected",
            Visibility::Private => "private",
        }
    }
}

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum ArrayKey {
    Int(i64),
    Str(Rc<Vec<u8>>),
}

impl ArrayKey {
    /// String keys holding a canonical decimal integer become integer keys.
    pub fn from_bytes(bytes: &[u8]) -> ArrayKey {
        match canonical_int(bytes) {
            Some(i) => ArrayKey::Int(i),
            None => ArrayKey::Str(Rc::new(bytes.to_vec())),
        }
    }

    pub fn to_val(&self) -> Val {
        match self {
            ArrayKey::Int(i) => Val::Int(*i),
            ArrayKey::Str(s) => Val::String(s.clone()),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            ArrayKey::Int(i) => i.to_string().into_bytes(),
            ArrayKey::Str(s) => s.to_vec(),
        }
    }
}

fn canonical_int(bytes: &[u8]) -> Option<i64> {
    let digits = bytes.strip_prefix(b"-").unwrap_or(bytes);
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    if digits.len() > 1 && digits[0] == b'0' {
        return None;
    }
    if bytes == b"-0" {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// A shared variable slot. Binding two names with `&` makes them share one cell.
#[derive(Clone, Default)]
pub struct Reference(Rc<RefCell<Val>>);

impl Reference {
    pub fn new(val: Val) -> Self {
        Reference(Rc::new(RefCell::new(val)))
    }

    pub fn get(&self) -> Val {
        self.0.borrow().clone()
    }

    /// Replaces the contents. The previous value is dropped after the borrow ends.
    pub fn set(&self, val: Val) {
        let old = std::mem::replace(&mut *self.0.borrow_mut(), val);
        drop(old);
    }

    pub fn take(&self) -> Val {
        std::mem::replace(&mut *self.0.borrow_mut(), Val::Null)
    }

    pub fn borrow(&self) -> Ref<'_, Val> {
        self.0.borrow()
    }

    pub fn try_borrow(&self) -> Option<Ref<'_, Val>> {
        self.0.try_borrow().ok()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, Val> {
        self.0.borrow_mut()
    }

    pub fn ptr_eq(&self, other: &Reference) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }
}

impl Debug for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(val) => write!(f, "Ref({:?})", *val),
            Err(_) => write!(f, "Ref(<borrowed>)"),
        }
    }
}

pub struct ObjectCell {
    pub id: u32,
    pub class: Rc<ClassDef>,
    pub data: RefCell<ObjectData>,
    store: Rc<ObjectStore>,
    /// Set for classes with a destructor or an internal cleanup hook
    wants_release: bool,
    destructed: Cell<bool>,
}

impl Drop for ObjectCell {
    fn drop(&mut self) {
        self.store.on_free(self.id);
    }
}

#[derive(Default)]
pub struct ObjectData {
    pub properties: IndexMap<Symbol, Val>,
    /// Payload of internal classes (closures, generators).
    pub internal: Option<Rc<dyn InternalState>>,
}

/// Native state attached to an object. The cycle collector walks it
/// through `trace`.
pub trait InternalState: Any {
    fn trace(&self, tracer: &mut dyn Tracer);
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;
}

/// Visitor over the counted edges held by a value.
pub trait Tracer {
    fn value(&mut self, val: &Val);
    fn cell(&mut self, cell: &Reference);
    fn object(&mut self, obj: &ObjectRef);
}

/// Counted handle to an object. Dropping the last handle of an object
/// with a pending destructor moves it to the store's release queue
/// instead of freeing it, so the VM can run `__destruct` at the next
/// safe point.
pub struct ObjectRef(Rc<ObjectCell>);

impl ObjectRef {
    pub(crate) fn new(
        id: u32,
        class: Rc<ClassDef>,
        data: ObjectData,
        store: Rc<ObjectStore>,
        wants_release: bool,
    ) -> Self {
        ObjectRef(Rc::new(ObjectCell {
            id,
            class,
            data: RefCell::new(data),
            store,
            wants_release,
            destructed: Cell::new(false),
        }))
    }

    pub fn id(&self) -> u32 {
        self.0.id
    }

    pub fn class(&self) -> &Rc<ClassDef> {
        &self.0.class
    }

    pub fn borrow(&self) -> Ref<'_, ObjectData> {
        self.0.data.borrow()
    }

    pub fn borrow_mut(&self) -> RefMut<'_, ObjectData> {
        self.0.data.borrow_mut()
    }

    pub fn try_borrow(&self) -> Option<Ref<'_, ObjectData>> {
        self.0.data.try_borrow().ok()
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as *const () as usize
    }

    pub fn downgrade(&self) -> Weak<ObjectCell> {
        Rc::downgrade(&self.0)
    }

    pub fn upgrade(weak: &Weak<ObjectCell>) -> Option<ObjectRef> {
        weak.upgrade().map(ObjectRef)
    }

    pub fn is_destructed(&self) -> bool {
        self.0.destructed.get()
    }

    /// Marks the destructor as done (or no longer wanted). Returns the previous state.
    pub fn mark_destructed(&self) -> bool {
        self.0.destructed.replace(true)
    }

    pub fn wants_release(&self) -> bool {
        self.0.wants_release
    }

    pub fn property(&self, name: Symbol) -> Option<Val> {
        self.0.data.borrow().properties.get(&name).map(Val::deref_clone)
    }

    pub fn set_property(&self, name: Symbol, val: Val) {
        let old = self.0.data.borrow_mut().properties.insert(name, val);
        drop(old);
    }

    pub fn internal<T: 'static>(&self) -> Option<Rc<T>> {
        let internal = self.0.data.borrow().internal.clone()?;
        internal.into_any().downcast::<T>().ok()
    }

    pub fn set_internal(&self, state: Rc<dyn InternalState>) {
        self.0.data.borrow_mut().internal = Some(state);
    }
}

impl Clone for ObjectRef {
    fn clone(&self) -> Self {
        ObjectRef(Rc::clone(&self.0))
    }
}

impl Drop for ObjectRef {
    fn drop(&mut self) {
        if Rc::strong_count(&self.0) != 1 || !self.0.wants_release || self.0.destructed.get() {
            return;
        }
        if self.0.store.defer_release(ObjectRef(Rc::clone(&self.0))) {
            self.0.destructed.set(true);
        }
    }
}

impl Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Object(#{})", self.0.id)
    }
}

/// File-like handle created by `fopen` and the standard streams.
#[derive(Debug)]
pub struct Resource {
    pub id: u32,
    pub kind: &'static str,
    pub payload: RefCell<Box<dyn Any>>,
}

#[derive(Debug, Clone, Default)]
pub enum Val {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(Rc<Vec<u8>>),
    Array(Rc<ArrayData>),
    Object(ObjectRef),
    Resource(Rc<Resource>),
    /// Reference binding, only ever stored in array slots and argument lists
    Ref(Reference),
    /// Marks `$a[]` on the operand stack
    AppendPlaceholder,
    /// Unset variable or typed property without a value
    Uninitialized,
}

impl Val {
    pub fn string(bytes: impl Into<Vec<u8>>) -> Val {
        Val::String(Rc::new(bytes.into()))
    }

    pub fn empty_array() -> Val {
        Val::Array(Rc::new(ArrayData::new()))
    }

    /// Resolves a reference binding to its current value.
    pub fn deref_clone(&self) -> Val {
        match self {
            Val::Ref(r) => r.get(),
            other => other.clone(),
        }
    }

    pub fn into_deref(self) -> Val {
        match self {
            Val::Ref(r) => r.get(),
            other => other,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Val::Null | Val::Uninitialized)
    }

    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Val::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Val::Null | Val::Uninitialized => "null",
            Val::Bool(_) => "bool",
            Val::Int(_) => "int",
            Val::Float(_) => "float",
            Val::String(_) => "string",
            Val::Array(_) => "array",
            Val::Object(_) => "object",
            Val::Resource(_) => "resource",
            Val::Ref(r) => r.borrow().type_name(),
            Val::AppendPlaceholder => "append_placeholder",
        }
    }

    /// Name used by `gettype()`.
    pub fn gettype_name(&self) -> &'static str {
        match self {
            Val::Null | Val::Uninitialized => "NULL",
            Val::Bool(_) => "boolean",
            Val::Int(_) => "integer",
            Val::Float(_) => "double",
            Val::String(_) => "string",
            Val::Array(_) => "array",
            Val::Object(_) => "object",
            Val::Resource(_) => "resource",
            Val::Ref(r) => r.borrow().gettype_name(),
            Val::AppendPlaceholder => "unknown type",
        }
    }

    pub fn to_bool(&self) -> bool {
        match self {
            Val::Null | Val::Uninitialized | Val::AppendPlaceholder => false,
            Val::Bool(b) => *b,
            Val::Int(i) => *i != 0,
            Val::Float(f) => *f != 0.0,
            Val::String(s) => !(s.is_empty() || s.as_slice() == b"0"),
            Val::Array(arr) => !arr.is_empty(),
            Val::Object(_) | Val::Resource(_) => true,
            Val::Ref(r) => r.borrow().to_bool(),
        }
    }

    pub fn to_int(&self) -> i64 {
        match self {
            Val::Null | Val::Uninitialized | Val::AppendPlaceholder => 0,
            Val::Bool(b) => i64::from(*b),
            Val::Int(i) => *i,
            Val::Float(f) => float_to_int(*f),
            Val::String(s) => match parse_numeric_prefix(s).0 {
                Numeric::Int(i) => i,
                Numeric::Float(f) => float_to_int(f),
            },
            Val::Array(arr) => i64::from(!arr.is_empty()),
            Val::Object(_) => 1,
            Val::Resource(r) => i64::from(r.id),
            Val::Ref(r) => r.borrow().to_int(),
        }
    }

    pub fn to_float(&self) -> f64 {
        match self {
            Val::Null | Val::Uninitialized | Val::AppendPlaceholder => 0.0,
            Val::Bool(b) => f64::from(u8::from(*b)),
            Val::Int(i) => *i as f64,
            Val::Float(f) => *f,
            Val::String(s) => match parse_numeric_prefix(s).0 {
                Numeric::Int(i) => i as f64,
                Numeric::Float(f) => f,
            },
            Val::Array(arr) => f64::from(u8::from(!arr.is_empty())),
            Val::Object(_) => 1.0,
            Val::Resource(r) => f64::from(r.id),
            Val::Ref(r) => r.borrow().to_float(),
        }
    }

    /// String form of non-object values. Objects need the VM for `__toString`.
    pub fn scalar_to_bytes(&self) -> Vec<u8> {
        match self {
            Val::Null | Val::Uninitialized | Val::AppendPlaceholder => Vec::new(),
            Val::Bool(true) => b"1".to_vec(),
            Val::Bool(false) => Vec::new(),
            Val::Int(i) => i.to_string().into_bytes(),
            Val::Float(f) => format_float(*f, 14).into_bytes(),
            Val::String(s) => s.to_vec(),
            Val::Array(_) => b"Array".to_vec(),
            Val::Object(_) => b"Object".to_vec(),
            Val::Resource(r) => format!("Resource id #{}", r.id).into_bytes(),
            Val::Ref(r) => r.borrow().scalar_to_bytes(),
        }
    }

    /// Numeric value for arithmetic; `None` for arrays and objects.
    pub fn to_number(&self) -> Option<Numeric> {
        Some(match self {
            Val::Int(i) => Numeric::Int(*i),
            Val::Float(f) => Numeric::Float(*f),
            Val::Null | Val::Uninitialized => Numeric::Int(0),
            Val::Bool(b) => Numeric::Int(i64::from(*b)),
            Val::String(s) => parse_numeric_prefix(s).0,
            Val::Resource(r) => Numeric::Int(i64::from(r.id)),
            Val::Ref(r) => return r.borrow().to_number(),
            Val::Array(_) | Val::Object(_) | Val::AppendPlaceholder => return None,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    pub fn into_val(self) -> Val {
        match self {
            Numeric::Int(i) => Val::Int(i),
            Numeric::Float(f) => Val::Float(f),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(i) => i as f64,
            Numeric::Float(f) => f,
        }
    }
}

/// How much of a string was numeric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericKind {
    /// The whole string (modulo surrounding whitespace) is a number
    Full,
    /// A numeric prefix followed by other characters: "12abc"
    Leading,
    None,
}

/// Parses the numeric prefix of a string the way arithmetic operators do.
pub fn parse_numeric_prefix(s: &[u8]) -> (Numeric, NumericKind) {
    let is_ws = |b: &u8| matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c);
    let start = s.iter().position(|b| !is_ws(b)).unwrap_or(s.len());
    let mut i = start;
    if i < s.len() && matches!(s[i], b'+' | b'-') {
        i += 1;
    }
    let int_start = i;
    while i < s.len() && s[i].is_ascii_digit() {
        i += 1;
    }
    let mut int_digits = i - int_start;
    let mut is_float = false;
    if i < s.len() && s[i] == b'.' {
        let frac_start = i + 1;
        let mut j = frac_start;
        while j < s.len() && s[j].is_ascii_digit() {
            j += 1;
        }
        if int_digits > 0 || j > frac_start {
            is_float = true;
            int_digits += j - frac_start;
            i = j;
        }
    }
    if int_digits == 0 {
        return (Numeric::Int(0), NumericKind::None);
    }
    if i < s.len() && matches!(s[i], b'e' | b'E') {
        let mut j = i + 1;
        if j < s.len() && matches!(s[j], b'+' | b'-') {
            j += 1;
        }
        if j < s.len() && s[j].is_ascii_digit() {
            while j < s.len() && s[j].is_ascii_digit() {
                j += 1;
            }
            is_float = true;
            i = j;
        }
    }
    let text = std::str::from_utf8(&s[start..i]).unwrap_or("0");
    let value = if is_float {
        Numeric::Float(text.parse().unwrap_or(0.0))
    } else {
        match text.parse::<i64>() {
            Ok(v) => Numeric::Int(v),
            Err(_) => Numeric::Float(text.parse().unwrap_or(0.0)),
        }
    };
    let rest_is_ws = s[i..].iter().all(is_ws);
    let kind = if rest_is_ws {
        NumericKind::Full
    } else {
        NumericKind::Leading
    };
    (value, kind)
}

/// Whole-string numeric check used by comparisons and `is_numeric`.
pub fn parse_numeric_string(s: &[u8]) -> Option<Numeric> {
    match parse_numeric_prefix(s) {
        (n, NumericKind::Full) => Some(n),
        _ => None,
    }
}

pub fn float_to_int(f: f64) -> i64 {
    if f.is_nan() || f.is_infinite() {
        0
    } else if f >= i64::MAX as f64 || f <= i64::MIN as f64 {
        // Out of range: PHP 8 wraps modularly on 64-bit
        (f % 18_446_744_073_709_551_616.0) as i128 as i64
    } else {
        f as i64
    }
}

/// Formats a float with `precision` significant digits (`%.{precision}G`),
/// the representation used by echo and string conversion.
pub fn format_float(f: f64, precision: usize) -> String {
    if f.is_nan() {
        return "NAN".into();
    }
    if f.is_infinite() {
        return if f > 0.0 { "INF".into() } else { "-INF".into() };
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0".into() } else { "0".into() };
    }
    let formatted = format!("{:.*e}", precision.saturating_sub(1), f);
    render_exponent_form(&formatted, precision as i32)
}

/// Shortest round-trip representation, used by var_dump and var_export.
pub fn format_float_repr(f: f64) -> String {
    if f.is_nan() || f.is_infinite() || f == 0.0 {
        return format_float(f, 17);
    }
    let formatted = format!("{:e}", f);
    render_exponent_form(&formatted, 17)
}

fn render_exponent_form(formatted: &str, precision: i32) -> String {
    let Some((mantissa, exp)) = formatted.split_once('e') else {
        return formatted.to_string();
    };
    let exp: i32 = exp.parse().unwrap_or(0);
    let negative = mantissa.starts_with('-');
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = digits.trim_end_matches('0');
    let digits = if digits.is_empty() { "0" } else { digits };
    let sign = if negative { "-" } else { "" };

    if exp < -4 || exp >= precision {
        let (first, rest) = digits.split_at(1);
        let frac = if rest.is_empty() { "0" } else { rest };
        let exp_sign = if exp < 0 { '-' } else { '+' };
        return format!("{sign}{first}.{frac}E{exp_sign}{}", exp.abs());
    }
    if exp < 0 {
        let zeros = "0".repeat((-exp - 1) as usize);
        return format!("{sign}0.{zeros}{digits}");
    }
    let int_len = exp as usize + 1;
    if digits.len() <= int_len {
        format!("{sign}{digits}{}", "0".repeat(int_len - digits.len()))
    } else {
        let (int_part, frac_part) = digits.split_at(int_len);
        format!("{sign}{int_part}.{frac_part}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_string_keys_normalize() {
        assert_eq!(ArrayKey::from_bytes(b"42"), ArrayKey::Int(42));
        assert_eq!(ArrayKey::from_bytes(b"-7"), ArrayKey::Int(-7));
        assert!(matches!(ArrayKey::from_bytes(b"042"), ArrayKey::Str(_)));
        assert!(matches!(ArrayKey::from_bytes(b"1.5"), ArrayKey::Str(_)));
    }

    #[test]
    fn next_free_tracks_largest_int_key() {
        let mut arr = ArrayData::new();
        arr.insert(ArrayKey::Int(5), Val::Int(1));
        arr.push(Val::Int(2));
        assert_eq!(arr.next_index(), 7);
        arr.remove(&ArrayKey::Int(6));
        assert_eq!(arr.next_index(), 7);
    }

    #[test]
    fn insert_writes_through_reference_slots() {
        let cell = Reference::new(Val::Int(1));
        let mut arr = ArrayData::new();
        arr.insert_raw(ArrayKey::Int(0), Val::Ref(cell.clone()));
        arr.insert(ArrayKey::Int(0), Val::Int(9));
        assert!(matches!(cell.get(), Val::Int(9)));
    }

    #[test]
    fn numeric_prefix_parsing() {
        assert_eq!(parse_numeric_prefix(b" 12"), (Numeric::Int(12), NumericKind::Full));
        assert_eq!(parse_numeric_prefix(b"12abc"), (Numeric::Int(12), NumericKind::Leading));
        assert_eq!(parse_numeric_prefix(b"1.5e3"), (Numeric::Float(1500.0), NumericKind::Full));
        assert_eq!(parse_numeric_prefix(b"abc").1, NumericKind::None);
        assert_eq!(parse_numeric_prefix(b".5").0, Numeric::Float(0.5));
    }

    #[test]
    fn float_formatting_matches_echo_rules() {
        assert_eq!(format_float(0.1 + 0.2, 14), "0.3");
        assert_eq!(format_float(1.0, 14), "1");
        assert_eq!(format_float(-2.5, 14), "-2.5");
        assert_eq!(format_float(1e25, 14), "1.0E+25");
        assert_eq!(format_float(0.00001, 14), "1.0E-5");
        assert_eq!(format_float(123456.0, 14), "123456");
        assert_eq!(format_float_repr(0.1 + 0.2), "0.30000000000000004");
        assert_eq!(format_float_repr(2.0), "2");
    }
}
