//! Canonical forms for method signature strings.
//!
//! Signatures reach the engine from several producers (the clustering collaborator, the
//! dependency analyzer, our own parser) and each spells them a little differently:
//! parameter names may or may not be present, varargs may be written as `T...` or `T[]`,
//! and some upstream parsers drop array brackets entirely. [`normalize_signature`] maps a
//! signature to the set of spellings it is considered equal to, and two signatures match
//! when those sets intersect.

use std::collections::BTreeSet;

/// Above this many array-typed parameters we stop expanding every combination and only
/// emit the uniform spellings.
const MAX_EXPANDED_ARRAY_PARAMS: usize = 8;

#[derive(Clone, Debug, PartialEq, Eq)]
struct ParamType {
    base: String,
    /// Trailing `[]` pairs, not counting a varargs marker.
    dims: usize,
    variadic: bool,
}

impl ParamType {
    fn total_dims(&self) -> usize {
        self.dims + usize::from(self.variadic)
    }

    fn canonical(&self) -> String {
        let mut out = self.base.clone();
        for _ in 0..self.dims {
            out.push_str("[]");
        }
        if self.variadic {
            out.push_str("...");
        }
        out
    }

    /// Spellings of this parameter: brackets, varargs (last parameter only), bare.
    fn alternatives(&self, is_last: bool) -> Vec<String> {
        let total = self.total_dims();
        if total == 0 {
            return vec![self.base.clone()];
        }
        let mut out = vec![format!("{}{}", self.base, "[]".repeat(total))];
        if is_last {
            out.push(format!("{}{}...", self.base, "[]".repeat(total - 1)));
        }
        out.push(self.base.clone());
        out
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ParsedSignature {
    name: String,
    params: Vec<ParamType>,
}

impl ParsedSignature {
    fn parse(signature: &str) -> Self {
        let signature = signature.trim();
        let Some(open) = signature.find('(') else {
            return Self {
                name: simple_name(signature).to_string(),
                params: Vec::new(),
            };
        };
        let close = signature.rfind(')').filter(|&close| close > open);
        let inner = match close {
            Some(close) => &signature[open + 1..close],
            None => &signature[open + 1..],
        };

        let params = split_top_level(inner, ',')
            .into_iter()
            .filter(|param| !param.trim().is_empty())
            .map(parse_param)
            .collect();

        Self {
            name: simple_name(&signature[..open]).to_string(),
            params,
        }
    }

    fn render(&self, params: &[String]) -> String {
        format!("{}({})", self.name, params.join(","))
    }

    fn canonical(&self) -> String {
        let params: Vec<String> = self.params.iter().map(ParamType::canonical).collect();
        self.render(&params)
    }

    fn forms(&self) -> BTreeSet<String> {
        let last = self.params.len().saturating_sub(1);
        let array_params = self.params.iter().filter(|p| p.total_dims() > 0).count();

        let mut forms = BTreeSet::new();
        if array_params > MAX_EXPANDED_ARRAY_PARAMS {
            for choice in 0..3 {
                let params: Vec<String> = self
                    .params
                    .iter()
                    .enumerate()
                    .map(|(idx, param)| {
                        let alternatives = param.alternatives(idx == last);
                        let pick = match choice {
                            0 => 0,
                            1 if alternatives.len() == 3 => 1,
                            1 => 0,
                            _ => alternatives.len() - 1,
                        };
                        alternatives[pick].clone()
                    })
                    .collect();
                forms.insert(self.render(&params));
            }
            forms.insert(self.canonical());
            return forms;
        }

        let mut partial: Vec<Vec<String>> = vec![Vec::new()];
        for (idx, param) in self.params.iter().enumerate() {
            let alternatives = param.alternatives(idx == last);
            let mut next = Vec::with_capacity(partial.len() * alternatives.len());
            for prefix in &partial {
                for alternative in &alternatives {
                    let mut params = prefix.clone();
                    params.push(alternative.clone());
                    next.push(params);
                }
            }
            partial = next;
        }
        for params in partial {
            forms.insert(self.render(&params));
        }
        forms
    }
}

/// The canonical spelling of `signature`: `name(T1,T2[],T3...)`.
///
/// Parameter names, annotations, `final` and incidental whitespace are dropped; a varargs
/// parameter keeps the `...` marker.
pub fn canonical_signature(signature: &str) -> String {
    ParsedSignature::parse(signature).canonical()
}

/// Every spelling `signature` is considered equivalent to, canonical form included.
pub fn normalize_signature(signature: &str) -> BTreeSet<String> {
    ParsedSignature::parse(signature).forms()
}

/// Whether two signature strings denote the same method up to formatting.
pub fn signatures_match(a: &str, b: &str) -> bool {
    if canonical_signature(a) == canonical_signature(b) {
        return true;
    }
    let forms = normalize_signature(a);
    normalize_signature(b)
        .iter()
        .any(|form| forms.contains(form))
}

/// The method name of a signature string.
pub fn signature_name(signature: &str) -> String {
    ParsedSignature::parse(signature).name
}

/// Insertion-ordered set of signatures with normalized membership tests.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SignatureSet {
    entries: Vec<String>,
    forms: BTreeSet<String>,
}

impl SignatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `signature` unless an equivalent spelling is already present.
    pub fn insert(&mut self, signature: &str) -> bool {
        if self.contains(signature) {
            return false;
        }
        self.entries.push(signature.to_string());
        self.forms.extend(normalize_signature(signature));
        true
    }

    pub fn contains(&self, signature: &str) -> bool {
        normalize_signature(signature)
            .iter()
            .any(|form| self.forms.contains(form))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for SignatureSet {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut set = SignatureSet::new();
        for signature in iter {
            set.insert(signature);
        }
        set
    }
}

/// The last identifier of a (possibly qualified, possibly modifier-prefixed) name.
fn simple_name(head: &str) -> &str {
    let head = head.trim();
    let last_token = head.rsplit(char::is_whitespace).next().unwrap_or(head);
    last_token.rsplit('.').next().unwrap_or(last_token)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

/// Splits on `sep` outside of `<...>`, `(...)` and `[...]`.
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0usize;
    for (idx, ch) in text.char_indices() {
        match ch {
            '<' | '(' | '[' => depth += 1,
            '>' | ')' | ']' => depth -= 1,
            c if c == sep && depth <= 0 => {
                parts.push(&text[start..idx]);
                start = idx + ch.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Strips leading annotations (`@A`, `@a.B(x = 1)`) and `final`.
fn strip_param_modifiers(mut text: &str) -> &str {
    loop {
        text = text.trim_start();
        if let Some(rest) = text.strip_prefix('@') {
            let name_len = rest
                .find(|c: char| !(is_ident_char(c) || c == '.'))
                .unwrap_or(rest.len());
            let mut after = rest[name_len..].trim_start();
            if after.starts_with('(') {
                let mut depth = 0i32;
                let mut end = after.len();
                for (idx, ch) in after.char_indices() {
                    match ch {
                        '(' => depth += 1,
                        ')' => {
                            depth -= 1;
                            if depth == 0 {
                                end = idx + 1;
                                break;
                            }
                        }
                        _ => {}
                    }
                }
                after = &after[end..];
            }
            text = after;
            continue;
        }
        if let Some(rest) = text.strip_prefix("final") {
            if rest.starts_with(char::is_whitespace) {
                text = rest;
                continue;
            }
        }
        return text;
    }
}

/// Collapses whitespace inside a type spelling: `Map<String, Integer>` -> `Map<String,Integer>`.
pub(crate) fn collapse_type(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;
    for ch in text.trim().chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            let prev_is_word = out
                .chars()
                .last()
                .map(|c| is_ident_char(c) || c == '?')
                .unwrap_or(false);
            if prev_is_word && (is_ident_char(ch) || ch == '?') {
                out.push(' ');
            }
            pending_space = false;
        }
        out.push(ch);
    }
    out
}

fn parse_param(text: &str) -> ParamType {
    let text = strip_param_modifiers(text).trim();
    let bytes: Vec<(usize, char)> = text.char_indices().collect();

    // Type name with optional type arguments.
    let mut idx = 0usize;
    let mut depth = 0i32;
    while idx < bytes.len() {
        let (offset, ch) = bytes[idx];
        if depth <= 0 && text[offset..].starts_with("...") {
            break;
        }
        match ch {
            '<' => depth += 1,
            '>' => depth -= 1,
            c if depth > 0 || is_ident_char(c) || c == '.' || c == '?' => {}
            c if c.is_whitespace() => {
                // Whitespace ends the type name unless it is followed by more of the type
                // (`Map<K, V>` is handled above, `int []` below).
                let rest = text[bytes[idx].0..].trim_start();
                if !(rest.starts_with('[') || rest.starts_with('<') || rest.starts_with("...")) {
                    break;
                }
            }
            _ => break,
        }
        idx += 1;
    }
    let type_end = bytes.get(idx).map(|(offset, _)| *offset).unwrap_or(text.len());
    let base_part = &text[..type_end];

    // Split off trailing `[]` groups that were consumed as part of whitespace lookahead.
    let (base_part, mut dims) = split_dims(base_part);
    let mut rest = &text[type_end..];

    let mut variadic = false;
    loop {
        let trimmed = rest.trim_start();
        if let Some(after) = trimmed.strip_prefix('[') {
            let after = after.trim_start();
            if let Some(after) = after.strip_prefix(']') {
                dims += 1;
                rest = after;
                continue;
            }
        }
        if let Some(after) = trimmed.strip_prefix("...") {
            variadic = true;
            rest = after;
            continue;
        }
        rest = trimmed;
        break;
    }

    // Optional parameter name followed by C-style dimensions (`int a[]`).
    let name_len = rest.find(|c: char| !is_ident_char(c)).unwrap_or(rest.len());
    let mut after_name = &rest[name_len..];
    loop {
        let trimmed = after_name.trim_start();
        match trimmed.strip_prefix('[').map(str::trim_start) {
            Some(after) if after.starts_with(']') => {
                dims += 1;
                after_name = &after[1..];
            }
            _ => break,
        }
    }

    ParamType {
        base: collapse_type(base_part),
        dims,
        variadic,
    }
}

fn split_dims(text: &str) -> (&str, usize) {
    let mut base = text.trim_end();
    let mut dims = 0usize;
    loop {
        let Some(stripped) = base.strip_suffix(']') else {
            break;
        };
        let Some(stripped) = stripped.trim_end().strip_suffix('[') else {
            break;
        };
        dims += 1;
        base = stripped.trim_end();
    }
    (base, dims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_drops_parameter_names() {
        assert_eq!(canonical_signature("deposit(double amount)"), "deposit(double)");
        assert_eq!(canonical_signature("deposit(double)"), "deposit(double)");
        assert_eq!(canonical_signature("  getBalance ( ) "), "getBalance()");
    }

    #[test]
    fn canonical_handles_generics_and_modifiers() {
        assert_eq!(
            canonical_signature("put(final Map<String, List<Integer>> entries, @Nullable String key)"),
            "put(Map<String,List<Integer>>,String)"
        );
        assert_eq!(
            canonical_signature("public static <T> void sort(List<? extends T> items)"),
            "sort(List<? extends T>)"
        );
    }

    #[test]
    fn canonical_folds_c_style_dimensions() {
        assert_eq!(canonical_signature("sum(int values[])"), "sum(int[])");
        assert_eq!(canonical_signature("sum(int [] values)"), "sum(int[])");
        assert_eq!(canonical_signature("grid(int[][] cells)"), "grid(int[][])");
    }

    #[test]
    fn varargs_arrays_and_bare_types_are_equivalent() {
        let forms = normalize_signature("log(String fmt, Object... args)");
        assert!(forms.contains("log(String,Object...)"));
        assert!(forms.contains("log(String,Object[])"));
        assert!(forms.contains("log(String,Object)"));

        assert!(signatures_match("log(String, Object[])", "log(String fmt, Object... args)"));
        assert!(signatures_match("main(String)", "main(String[] args)"));
        assert!(!signatures_match("main(int)", "main(String[] args)"));
        assert!(!signatures_match("deposit(double)", "withdraw(double)"));
    }

    #[test]
    fn varargs_marker_only_applies_to_last_parameter() {
        let forms = normalize_signature("copy(int[] from, int[] to)");
        assert!(forms.contains("copy(int[],int...)"));
        assert!(!forms.contains("copy(int...,int[])"));
        assert!(forms.contains("copy(int,int)"));
    }

    #[test]
    fn signature_set_uses_normalized_membership() {
        let mut set = SignatureSet::new();
        assert!(set.insert("process(String[] args)"));
        assert!(!set.insert("process(String...)"));
        assert!(set.contains("process(String)"));
        assert!(!set.contains("process(int)"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn bare_names_are_zero_arity() {
        assert_eq!(canonical_signature("reset"), "reset()");
        assert_eq!(signature_name("Account.reset()"), "reset");
    }
}
