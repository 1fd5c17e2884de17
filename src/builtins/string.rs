use crate::builtins::math::round_half_away;
use crate::builtins::{arg, arg_array, arg_int, arg_string, arg_type_error, expect_args, write_back};
use crate::core::value::{ArrayData, Val, format_float};
use crate::vm::engine::{VM, VmError};
use memchr::memmem;
use std::rc::Rc;

pub const STR_PAD_LEFT: i64 = 0;
pub const STR_PAD_RIGHT: i64 = 1;
pub const STR_PAD_BOTH: i64 = 2;

const DEFAULT_TRIM_MASK: &[u8] = b" \t\n\r\0\x0B";

pub fn php_strlen(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "strlen", args, 1, 1)?;
    match arg(args, 0) {
        val @ Val::Array(_) => Err(arg_type_error(vm, "strlen", 0, "string", "string", &val)),
        val => Ok(Val::Int(vm.to_string_bytes(&val)?.len() as i64)),
    }
}

/// Start and end of `substr($s, $offset, $length)` within a string of `len` bytes.
fn substr_range(len: usize, offset: i64, length: Option<i64>) -> (usize, usize) {
    let len = len as i64;
    let start = if offset < 0 { (len + offset).max(0) } else { offset.min(len) };
    let end = match length {
        None => len,
        Some(l) if l < 0 => (len + l).max(start),
        Some(l) => (start + l).min(len),
    };
    (start as usize, end.max(start) as usize)
}

fn optional_int(args: &[Val], index: usize) -> Option<i64> {
    match arg(args, index) {
        Val::Null => None,
        other => Some(other.to_int()),
    }
}

pub fn php_substr(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "substr", args, 2, 3)?;
    let s = arg_string(vm, args, 0)?;
    let (start, end) = substr_range(s.len(), arg_int(args, 1), optional_int(args, 2));
    Ok(Val::string(&s[start..end]))
}

pub fn php_substr_count(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "substr_count", args, 2, 2)?;
    let haystack = arg_string(vm, args, 0)?;
    let needle = arg_string(vm, args, 1)?;
    if needle.is_empty() {
        return Err(vm.throw_error(b"ValueError", "substr_count(): Argument #2 ($needle) cannot be empty"));
    }
    Ok(Val::Int(memmem::find_iter(&haystack, &needle).count() as i64))
}

/// Resolves a search offset, throwing when it lies outside the haystack.
fn search_offset(vm: &mut VM, name: &str, len: usize, offset: i64) -> Result<usize, VmError> {
    let resolved = if offset < 0 { len as i64 + offset } else { offset };
    if resolved < 0 || resolved > len as i64 {
        let msg = format!("{}(): Argument #3 ($offset) must be contained in argument #1 ($haystack)", name);
        return Err(vm.throw_error(b"ValueError", msg));
    }
    Ok(resolved as usize)
}

fn position_or_false(pos: Option<usize>) -> Val {
    match pos {
        Some(p) => Val::Int(p as i64),
        None => Val::Bool(false),
    }
}

pub fn php_strpos(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "strpos", args, 2, 3)?;
    let haystack = arg_string(vm, args, 0)?;
    let needle = arg_string(vm, args, 1)?;
    let start = search_offset(vm, "strpos", haystack.len(), arg_int(args, 2))?;
    Ok(position_or_false(memmem::find(&haystack[start..], &needle).map(|p| p + start)))
}

pub fn php_stripos(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "stripos", args, 2, 3)?;
    let haystack = arg_string(vm, args, 0)?.to_ascii_lowercase();
    let needle = arg_string(vm, args, 1)?.to_ascii_lowercase();
    let start = search_offset(vm, "stripos", haystack.len(), arg_int(args, 2))?;
    Ok(position_or_false(memmem::find(&haystack[start..], &needle).map(|p| p + start)))
}

pub fn php_strrpos(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "strrpos", args, 2, 3)?;
    let haystack = arg_string(vm, args, 0)?;
    let needle = arg_string(vm, args, 1)?;
    let offset = arg_int(args, 2);
    let resolved = search_offset(vm, "strrpos", haystack.len(), offset)?;
    let found = if offset < 0 {
        // Negative offsets bound where the match may start
        let limit = (resolved + needle.len()).min(haystack.len());
        memmem::rfind(&haystack[..limit], &needle)
    } else {
        memmem::rfind(&haystack[resolved..], &needle).map(|p| p + resolved)
    };
    Ok(position_or_false(found))
}

pub fn php_str_contains(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "str_contains", args, 2, 2)?;
    let haystack = arg_string(vm, args, 0)?;
    let needle = arg_string(vm, args, 1)?;
    Ok(Val::Bool(memmem::find(&haystack, &needle).is_some()))
}

pub fn php_str_starts_with(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "str_starts_with", args, 2, 2)?;
    let haystack = arg_string(vm, args, 0)?;
    let needle = arg_string(vm, args, 1)?;
    Ok(Val::Bool(haystack.starts_with(&needle)))
}

pub fn php_str_ends_with(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "str_ends_with", args, 2, 2)?;
    let haystack = arg_string(vm, args, 0)?;
    let needle = arg_string(vm, args, 1)?;
    Ok(Val::Bool(haystack.ends_with(&needle)))
}

pub fn php_str_repeat(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "str_repeat", args, 2, 2)?;
    let s = arg_string(vm, args, 0)?;
    let times = arg_int(args, 1);
    if times < 0 {
        return Err(vm.throw_error(
            b"ValueError",
            "str_repeat(): Argument #2 ($times) must be greater than or equal to 0",
        ));
    }
    Ok(Val::string(s.repeat(times as usize)))
}

fn replace_bytes(subject: &[u8], search: &[u8], replace: &[u8], count: &mut i64) -> Vec<u8> {
    if search.is_empty() {
        return subject.to_vec();
    }
    let mut out = Vec::with_capacity(subject.len());
    let mut last = 0;
    for pos in memmem::find_iter(subject, search) {
        out.extend_from_slice(&subject[last..pos]);
        out.extend_from_slice(replace);
        last = pos + search.len();
        *count += 1;
    }
    out.extend_from_slice(&subject[last..]);
    out
}

/// Applies every search/replace pair of `str_replace` to one subject.
fn replace_all(
    vm: &mut VM,
    subject: &Val,
    search: &Val,
    replace: &Val,
    count: &mut i64,
) -> Result<Vec<u8>, VmError> {
    let mut text = vm.to_string_bytes(subject)?;
    match search {
        Val::Array(searches) => {
            let replacements: Option<Vec<Val>> = match replace {
                Val::Array(r) => Some(r.values().collect()),
                _ => None,
            };
            let fixed = match replacements {
                Some(_) => Vec::new(),
                None => vm.to_string_bytes(replace)?,
            };
            for (i, needle) in searches.values().enumerate() {
                let needle = vm.to_string_bytes(&needle)?;
                let with = match &replacements {
                    Some(list) => match list.get(i) {
                        Some(v) => vm.to_string_bytes(v)?,
                        None => Vec::new(),
                    },
                    None => fixed.clone(),
                };
                text = replace_bytes(&text, &needle, &with, count);
            }
        }
        _ => {
            let needle = vm.to_string_bytes(search)?;
            let with = vm.to_string_bytes(replace)?;
            text = replace_bytes(&text, &needle, &with, count);
        }
    }
    Ok(text)
}

pub fn php_str_replace(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "str_replace", args, 3, 4)?;
    let search = arg(args, 0);
    let replace = arg(args, 1);
    let subject = arg(args, 2);
    let mut count = 0;
    let result = match &subject {
        Val::Array(items) => {
            let mut out = ArrayData::with_capacity(items.len());
            for (key, item) in items.iter() {
                let replaced = replace_all(vm, &item.deref_clone(), &search, &replace, &mut count)?;
                out.insert(key.clone(), Val::string(replaced));
            }
            Val::Array(Rc::new(out))
        }
        other => Val::string(replace_all(vm, other, &search, &replace, &mut count)?),
    };
    write_back(args, 3, Val::Int(count));
    Ok(result)
}

pub fn php_strtoupper(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "strtoupper", args, 1, 1)?;
    Ok(Val::string(arg_string(vm, args, 0)?.to_ascii_uppercase()))
}

pub fn php_strtolower(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "strtolower", args, 1, 1)?;
    Ok(Val::string(arg_string(vm, args, 0)?.to_ascii_lowercase()))
}

pub fn php_ucfirst(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "ucfirst", args, 1, 1)?;
    let mut s = arg_string(vm, args, 0)?;
    if let Some(first) = s.first_mut() {
        first.make_ascii_uppercase();
    }
    Ok(Val::string(s))
}

pub fn php_lcfirst(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "lcfirst", args, 1, 1)?;
    let mut s = arg_string(vm, args, 0)?;
    if let Some(first) = s.first_mut() {
        first.make_ascii_lowercase();
    }
    Ok(Val::string(s))
}

pub fn php_ucwords(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "ucwords", args, 1, 2)?;
    let mut s = arg_string(vm, args, 0)?;
    let delimiters = if args.len() > 1 {
        arg_string(vm, args, 1)?
    } else {
        b" \t\r\n\x0C\x0B".to_vec()
    };
    let mut at_word_start = true;
    for b in s.iter_mut() {
        if at_word_start {
            b.make_ascii_uppercase();
        }
        at_word_start = delimiters.contains(b);
    }
    Ok(Val::string(s))
}

/// Expands a trim character list, including `a..z` ranges.
fn trim_mask(chars: &[u8]) -> [bool; 256] {
    let mut mask = [false; 256];
    let mut i = 0;
    while i < chars.len() {
        if i + 3 < chars.len() && chars[i + 1] == b'.' && chars[i + 2] == b'.' && chars[i] <= chars[i + 3] {
            for c in chars[i]..=chars[i + 3] {
                mask[c as usize] = true;
            }
            i += 4;
        } else {
            mask[chars[i] as usize] = true;
            i += 1;
        }
    }
    mask
}

fn trim_impl(vm: &mut VM, name: &str, args: &[Val], left: bool, right: bool) -> Result<Val, VmError> {
    expect_args(vm, name, args, 1, 2)?;
    let s = arg_string(vm, args, 0)?;
    let chars = if args.len() > 1 {
        arg_string(vm, args, 1)?
    } else {
        DEFAULT_TRIM_MASK.to_vec()
    };
    let mask = trim_mask(&chars);
    let mut start = 0;
    let mut end = s.len();
    if left {
        while start < end && mask[s[start] as usize] {
            start += 1;
        }
    }
    if right {
        while end > start && mask[s[end - 1] as usize] {
            end -= 1;
        }
    }
    Ok(Val::string(&s[start..end]))
}

pub fn php_trim(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    trim_impl(vm, "trim", args, true, true)
}

pub fn php_ltrim(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    trim_impl(vm, "ltrim", args, true, false)
}

pub fn php_rtrim(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    trim_impl(vm, "rtrim", args, false, true)
}

pub fn php_implode(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "implode", args, 1, 2)?;
    let (separator, pieces) = match (arg(args, 0), arg(args, 1)) {
        (Val::Array(pieces), Val::Null) if args.len() == 1 => (Vec::new(), pieces),
        (sep, Val::Array(pieces)) => (vm.to_string_bytes(&sep)?, pieces),
        (Val::Array(pieces), sep) => (vm.to_string_bytes(&sep)?, pieces),
        (_, other) if args.len() > 1 => return Err(arg_type_error(vm, "implode", 1, "array", "?array", &other)),
        (other, _) => return Err(arg_type_error(vm, "implode", 0, "separator", "array", &other)),
    };
    let mut out = Vec::new();
    for (i, piece) in pieces.values().enumerate() {
        if i > 0 {
            out.extend_from_slice(&separator);
        }
        out.extend_from_slice(&vm.to_string_bytes(&piece)?);
    }
    Ok(Val::string(out))
}

pub fn php_explode(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "explode", args, 2, 3)?;
    let separator = arg_string(vm, args, 0)?;
    let s = arg_string(vm, args, 1)?;
    let limit = if args.len() > 2 { arg_int(args, 2) } else { i64::MAX };
    if separator.is_empty() {
        return Err(vm.throw_error(b"ValueError", "explode(): Argument #1 ($separator) cannot be empty"));
    }
    let mut parts: Vec<&[u8]> = Vec::new();
    let mut last = 0;
    for pos in memmem::find_iter(&s, &separator) {
        if limit > 0 && parts.len() as i64 >= limit - 1 {
            break;
        }
        parts.push(&s[last..pos]);
        last = pos + separator.len();
    }
    parts.push(&s[last..]);
    if limit < 0 {
        let keep = parts.len() as i64 + limit;
        parts.truncate(keep.max(0) as usize);
    }
    let result: Vec<Val> = parts.into_iter().map(Val::string).collect();
    Ok(Val::Array(Rc::new(ArrayData::from(result))))
}

pub fn php_str_split(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "str_split", args, 1, 2)?;
    let s = arg_string(vm, args, 0)?;
    let size = if args.len() > 1 { arg_int(args, 1) } else { 1 };
    if size < 1 {
        return Err(vm.throw_error(b"ValueError", "str_split(): Argument #2 ($length) must be greater than 0"));
    }
    let chunks: Vec<Val> = if s.is_empty() {
        vec![Val::string(Vec::new())]
    } else {
        s.chunks(size as usize).map(Val::string).collect()
    };
    Ok(Val::Array(Rc::new(ArrayData::from(chunks))))
}

pub fn php_str_pad(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "str_pad", args, 2, 4)?;
    let s = arg_string(vm, args, 0)?;
    let length = arg_int(args, 1);
    let pad = if args.len() > 2 { arg_string(vm, args, 2)? } else { b" ".to_vec() };
    let pad_type = if args.len() > 3 { arg_int(args, 3) } else { STR_PAD_RIGHT };
    if pad.is_empty() {
        return Err(vm.throw_error(b"ValueError", "str_pad(): Argument #3 ($pad_string) must be a non-empty string"));
    }
    if !matches!(pad_type, STR_PAD_LEFT | STR_PAD_RIGHT | STR_PAD_BOTH) {
        return Err(vm.throw_error(
            b"ValueError",
            "str_pad(): Argument #4 ($pad_type) must be STR_PAD_LEFT, STR_PAD_RIGHT, or STR_PAD_BOTH",
        ));
    }
    if length <= s.len() as i64 {
        return Ok(Val::string(s));
    }
    let total = length as usize - s.len();
    let (left, right) = match pad_type {
        STR_PAD_LEFT => (total, 0),
        STR_PAD_BOTH => (total / 2, total - total / 2),
        _ => (0, total),
    };
    let fill = |n: usize| pad.iter().copied().cycle().take(n).collect::<Vec<u8>>();
    let mut out = fill(left);
    out.extend_from_slice(&s);
    out.extend(fill(right));
    Ok(Val::string(out))
}

pub fn php_strrev(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "strrev", args, 1, 1)?;
    let mut s = arg_string(vm, args, 0)?;
    s.reverse();
    Ok(Val::string(s))
}

fn ordering_to_int(ord: std::cmp::Ordering) -> Val {
    Val::Int(ord as i64)
}

pub fn php_strcmp(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "strcmp", args, 2, 2)?;
    let a = arg_string(vm, args, 0)?;
    let b = arg_string(vm, args, 1)?;
    Ok(ordering_to_int(a.cmp(&b)))
}

pub fn php_strcasecmp(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "strcasecmp", args, 2, 2)?;
    let a = arg_string(vm, args, 0)?.to_ascii_lowercase();
    let b = arg_string(vm, args, 1)?.to_ascii_lowercase();
    Ok(ordering_to_int(a.cmp(&b)))
}

pub fn php_strncmp(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "strncmp", args, 3, 3)?;
    let a = arg_string(vm, args, 0)?;
    let b = arg_string(vm, args, 1)?;
    let n = arg_int(args, 2);
    if n < 0 {
        return Err(vm.throw_error(b"ValueError", "strncmp(): Argument #3 ($length) must be greater than or equal to 0"));
    }
    let n = n as usize;
    Ok(ordering_to_int(a[..n.min(a.len())].cmp(&b[..n.min(b.len())])))
}

pub fn php_ord(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "ord", args, 1, 1)?;
    let s = arg_string(vm, args, 0)?;
    Ok(Val::Int(i64::from(s.first().copied().unwrap_or(0))))
}

pub fn php_chr(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "chr", args, 1, 1)?;
    Ok(Val::string(vec![arg_int(args, 0).rem_euclid(256) as u8]))
}

pub fn php_nl2br(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "nl2br", args, 1, 1)?;
    let s = arg_string(vm, args, 0)?;
    let mut out = Vec::with_capacity(s.len());
    let mut i = 0;
    while i < s.len() {
        let pair = matches!(&s[i..], [b'\r', b'\n', ..] | [b'\n', b'\r', ..]);
        if s[i] == b'\n' || s[i] == b'\r' {
            out.extend_from_slice(b"<br />");
            let width = if pair { 2 } else { 1 };
            out.extend_from_slice(&s[i..i + width]);
            i += width;
        } else {
            out.push(s[i]);
            i += 1;
        }
    }
    Ok(Val::string(out))
}

pub fn php_htmlspecialchars(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "htmlspecialchars", args, 1, 4)?;
    let s = arg_string(vm, args, 0)?;
    let mut out = Vec::with_capacity(s.len());
    for b in s {
        match b {
            b'&' => out.extend_from_slice(b"&amp;"),
            b'<' => out.extend_from_slice(b"&lt;"),
            b'>' => out.extend_from_slice(b"&gt;"),
            b'"' => out.extend_from_slice(b"&quot;"),
            b'\'' => out.extend_from_slice(b"&#039;"),
            other => out.push(other),
        }
    }
    Ok(Val::string(out))
}

pub fn php_number_format(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "number_format", args, 1, 4)?;
    let num = arg(args, 0).to_float();
    let decimals = arg_int(args, 1).max(0) as usize;
    let point = if args.len() > 2 { arg_string(vm, args, 2)? } else { b".".to_vec() };
    let separator = if args.len() > 3 { arg_string(vm, args, 3)? } else { b",".to_vec() };
    Ok(Val::string(number_format(num, decimals, &point, &separator)))
}

fn number_format(num: f64, decimals: usize, point: &[u8], separator: &[u8]) -> Vec<u8> {
    let rounded = round_half_away(num, decimals as i64);
    let text = format!("{:.*}", decimals, rounded.abs());
    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i.to_string(), Some(f.to_string())),
        None => (text, None),
    };
    let mut out = Vec::new();
    if rounded < 0.0 {
        out.push(b'-');
    }
    let digits = int_part.as_bytes();
    for (i, d) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.extend_from_slice(separator);
        }
        out.push(*d);
    }
    if let Some(frac) = frac_part {
        out.extend_from_slice(point);
        out.extend_from_slice(frac.as_bytes());
    }
    out
}

// ---- printf family ------------------------------------------------------

/// One `%` conversion of a format string.
#[derive(Debug, Default, PartialEq)]
struct FormatSpec {
    /// One-based argument number from `%n$`
    position: Option<usize>,
    left_align: bool,
    plus: bool,
    pad: Option<u8>,
    width: usize,
    precision: Option<usize>,
    conversion: u8,
}

fn parse_format_spec(fmt: &[u8]) -> Option<(FormatSpec, usize)> {
    let mut spec = FormatSpec::default();
    let mut i = 0;
    // Argnum: digits followed by '$'
    let digits = fmt.iter().take_while(|b| b.is_ascii_digit()).count();
    if digits > 0 && fmt.get(digits) == Some(&b'$') {
        spec.position = std::str::from_utf8(&fmt[..digits]).ok()?.parse().ok();
        i = digits + 1;
    }
    loop {
        match fmt.get(i)? {
            b'-' => spec.left_align = true,
            b'+' => spec.plus = true,
            b'0' => spec.pad = Some(b'0'),
            b' ' => spec.pad = Some(b' '),
            b'\'' => {
                spec.pad = Some(*fmt.get(i + 1)?);
                i += 1;
            }
            _ => break,
        }
        i += 1;
    }
    let start = i;
    while fmt.get(i).is_some_and(u8::is_ascii_digit) {
        i += 1;
    }
    if i > start {
        spec.width = std::str::from_utf8(&fmt[start..i]).ok()?.parse().ok()?;
    }
    if fmt.get(i) == Some(&b'.') {
        i += 1;
        let start = i;
        while fmt.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        spec.precision = Some(if i > start {
            std::str::from_utf8(&fmt[start..i]).ok()?.parse().ok()?
        } else {
            0
        });
    }
    spec.conversion = *fmt.get(i)?;
    Some((spec, i + 1))
}

/// `%e` the way PHP prints it: `1.5e+3`.
fn format_exponent(f: f64, precision: usize, upper: bool) -> String {
    let text = format!("{:.*e}", precision, f);
    let (mantissa, exp) = text.split_once('e').unwrap_or((&text, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let sign = if exp < 0 { '-' } else { '+' };
    let e = if upper { 'E' } else { 'e' };
    format!("{}{}{}{}", mantissa, e, sign, exp.abs())
}

fn apply_padding(spec: &FormatSpec, body: Vec<u8>, numeric: bool) -> Vec<u8> {
    if body.len() >= spec.width {
        return body;
    }
    let fill = spec.width - body.len();
    let pad = spec.pad.unwrap_or(b' ');
    if spec.left_align {
        let pad = if pad == b'0' && numeric { b' ' } else { pad };
        let mut out = body;
        out.extend(std::iter::repeat_n(pad, fill));
        return out;
    }
    if pad == b'0' && numeric && matches!(body.first(), Some(b'-' | b'+')) {
        let mut out = vec![body[0]];
        out.extend(std::iter::repeat_n(b'0', fill));
        out.extend_from_slice(&body[1..]);
        return out;
    }
    let mut out: Vec<u8> = std::iter::repeat_n(pad, fill).collect();
    out.extend_from_slice(&body);
    out
}

fn format_argument(vm: &mut VM, spec: &FormatSpec, value: &Val) -> Result<Vec<u8>, VmError> {
    let signed = |n: String, negative: bool| -> Vec<u8> {
        if spec.plus && !negative {
            format!("+{}", n).into_bytes()
        } else {
            n.into_bytes()
        }
    };
    let (body, numeric) = match spec.conversion {
        b's' => {
            let mut s = vm.to_string_bytes(value)?;
            if let Some(p) = spec.precision {
                s.truncate(p);
            }
            (s, false)
        }
        b'd' | b'i' => {
            let n = value.to_int();
            (signed(n.to_string(), n < 0), true)
        }
        b'u' => ((value.to_int() as u64).to_string().into_bytes(), true),
        b'f' | b'F' => {
            let f = value.to_float();
            let text = format!("{:.*}", spec.precision.unwrap_or(6), round_half_away(f, spec.precision.unwrap_or(6) as i64));
            (signed(text, f < 0.0), true)
        }
        b'e' | b'E' => {
            let f = value.to_float();
            let text = format_exponent(f, spec.precision.unwrap_or(6), spec.conversion == b'E');
            (signed(text, f < 0.0), true)
        }
        b'g' | b'G' => {
            let f = value.to_float();
            let precision = spec.precision.unwrap_or(6).max(1);
            let mut text = format_float(f, precision);
            if spec.conversion == b'g' {
                text = text.replace('E', "e");
            }
            (signed(text, f < 0.0), true)
        }
        b'x' => (format!("{:x}", value.to_int()).into_bytes(), true),
        b'X' => (format!("{:X}", value.to_int()).into_bytes(), true),
        b'o' => (format!("{:o}", value.to_int()).into_bytes(), true),
        b'b' => (format!("{:b}", value.to_int()).into_bytes(), true),
        b'c' => return Ok(vec![value.to_int() as u8]),
        other => {
            let msg = format!("Unknown format specifier \"{}\"", other as char);
            return Err(vm.throw_error(b"ValueError", msg));
        }
    };
    Ok(apply_padding(spec, body, numeric))
}

/// Formats `format` with `values` (the arguments after the format string).
fn format_printf(vm: &mut VM, format: &[u8], values: &[Val]) -> Result<Vec<u8>, VmError> {
    let mut out = Vec::with_capacity(format.len());
    let mut i = 0;
    let mut next = 0;
    while i < format.len() {
        let Some(offset) = memchr::memchr(b'%', &format[i..]) else {
            out.extend_from_slice(&format[i..]);
            break;
        };
        out.extend_from_slice(&format[i..i + offset]);
        i += offset + 1;
        if format.get(i) == Some(&b'%') {
            out.push(b'%');
            i += 1;
            continue;
        }
        let Some((spec, consumed)) = parse_format_spec(&format[i..]) else {
            return Err(vm.throw_error(b"ValueError", "Missing format specifier at end of string"));
        };
        i += consumed;
        let slot = match spec.position {
            Some(0) => {
                return Err(vm.throw_error(b"ValueError", "Argument number specifier must be greater than zero and less than 2147483647"));
            }
            Some(p) => p - 1,
            None => {
                next += 1;
                next - 1
            }
        };
        let Some(value) = values.get(slot) else {
            let msg = format!("{} arguments are required, {} given", slot + 2, values.len() + 1);
            return Err(vm.throw_error(b"ArgumentCountError", msg));
        };
        let value = value.deref_clone();
        out.extend(format_argument(vm, &spec, &value)?);
    }
    Ok(out)
}

pub fn php_sprintf(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "sprintf", args, 1, usize::MAX)?;
    let format = arg_string(vm, args, 0)?;
    Ok(Val::string(format_printf(vm, &format, &args[1..])?))
}

pub fn php_printf(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "printf", args, 1, usize::MAX)?;
    let format = arg_string(vm, args, 0)?;
    let out = format_printf(vm, &format, &args[1..])?;
    vm.echo(&out)?;
    Ok(Val::Int(out.len() as i64))
}

pub fn php_vsprintf(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "vsprintf", args, 2, 2)?;
    let format = arg_string(vm, args, 0)?;
    let values: Vec<Val> = arg_array(vm, "vsprintf", args, 1, "values")?.values().collect();
    Ok(Val::string(format_printf(vm, &format, &values)?))
}

pub fn php_vprintf(vm: &mut VM, args: &mut [Val]) -> Result<Val, VmError> {
    expect_args(vm, "vprintf", args, 2, 2)?;
    let format = arg_string(vm, args, 0)?;
    let values: Vec<Val> = arg_array(vm, "vprintf", args, 1, "values")?.values().collect();
    let out = format_printf(vm, &format, &values)?;
    vm.echo(&out)?;
    Ok(Val::Int(out.len() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_substr_range() {
        assert_eq!(substr_range(5, 1, None), (1, 5));
        assert_eq!(substr_range(5, -2, None), (3, 5));
        assert_eq!(substr_range(5, 1, Some(-1)), (1, 4));
        assert_eq!(substr_range(5, 10, None), (5, 5));
        assert_eq!(substr_range(5, 3, Some(-4)), (3, 3));
    }

    #[test]
    fn test_trim_mask_ranges() {
        let mask = trim_mask(b"a..c!");
        assert!(mask[b'a' as usize] && mask[b'b' as usize] && mask[b'c' as usize] && mask[b'!' as usize]);
        assert!(!mask[b'd' as usize]);
    }

    #[test]
    fn test_parse_format_spec() {
        let (spec, used) = parse_format_spec(b"'*10.2f rest").unwrap();
        assert_eq!(used, 7);
        assert_eq!(spec.pad, Some(b'*'));
        assert_eq!(spec.width, 10);
        assert_eq!(spec.precision, Some(2));
        assert_eq!(spec.conversion, b'f');

        let (spec, _) = parse_format_spec(b"2$-5s").unwrap();
        assert_eq!(spec.position, Some(2));
        assert!(spec.left_align);
    }

    #[test]
    fn test_padding_keeps_sign_first() {
        let spec = FormatSpec {
            pad: Some(b'0'),
            width: 5,
            conversion: b'd',
            ..Default::default()
        };
        assert_eq!(apply_padding(&spec, b"-3".to_vec(), true), b"-0003");
    }

    #[test]
    fn test_number_format() {
        assert_eq!(number_format(1234567.891, 2, b".", b","), b"1,234,567.89");
        assert_eq!(number_format(1234.5, 0, b".", b","), b"1,235");
        assert_eq!(number_format(-0.4, 0, b".", b","), b"0");
        assert_eq!(number_format(1000.0, 2, b",", b"."), b"1.000,00");
    }

    #[test]
    fn test_format_exponent() {
        assert_eq!(format_exponent(1500.0, 1, false), "1.5e+3");
        assert_eq!(format_exponent(0.00012, 2, true), "1.20E-4");
    }
}
