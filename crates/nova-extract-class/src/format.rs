//! Small text layout helpers for generated Java members.

/// Indents each non-empty line in `block` with `indent`.
#[must_use]
pub fn indent_block(block: &str, indent: &str) -> String {
    let mut out = String::with_capacity(block.len() + indent.len() * 4);
    for line in block.split_inclusive('\n') {
        let line_stripped = line.strip_suffix('\n').unwrap_or(line);
        if !line_stripped.trim().is_empty() {
            out.push_str(indent);
            out.push_str(line_stripped);
        }
        if line.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

/// Removes common leading indentation from all non-empty lines in `block`.
#[must_use]
pub fn dedent_block(block: &str) -> String {
    let lines: Vec<&str> = block.lines().collect();
    let min_indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.chars().take_while(|c| c.is_whitespace()).count())
        .min()
        .unwrap_or(0);

    let mut out = String::with_capacity(block.len());
    for (idx, line) in lines.iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        if line.trim().is_empty() {
            continue;
        }
        let byte_idx = line
            .char_indices()
            .nth(min_indent)
            .map(|(i, _)| i)
            .unwrap_or(line.len());
        out.push_str(&line[byte_idx..]);
    }
    out
}

/// Byte offset of the start of the line containing `offset`.
pub fn line_start(text: &str, offset: usize) -> usize {
    text[..offset].rfind('\n').map(|idx| idx + 1).unwrap_or(0)
}

/// Byte offset just past the newline ending the line containing `offset`.
pub fn line_end_inclusive(text: &str, offset: usize) -> usize {
    text[offset..]
        .find('\n')
        .map(|idx| offset + idx + 1)
        .unwrap_or(text.len())
}

/// The whitespace preceding `offset` on its line, or `None` when other text precedes it.
pub fn leading_indent(text: &str, offset: usize) -> Option<&str> {
    let prefix = &text[line_start(text, offset)..offset];
    prefix
        .chars()
        .all(|c| c == ' ' || c == '\t')
        .then_some(prefix)
}

/// Whether only spaces/tabs follow `offset` up to the end of its line.
pub fn rest_of_line_is_blank(text: &str, offset: usize) -> bool {
    let end = line_end_inclusive(text, offset);
    text[offset..end].trim().is_empty()
}

/// Upper-cases the first character (`count` -> `Count`).
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Lower-cases the first character (`Counter` -> `counter`).
pub fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Identifier tokens of `text` that are not member selections (`a.b` yields `a` only).
/// String and character literals are skipped.
pub(crate) fn identifiers(text: &str) -> impl Iterator<Item = &str> {
    let mut out = Vec::new();
    let mut prev: Option<char> = None;
    let mut chars = text.char_indices().peekable();
    while let Some((start, ch)) = chars.next() {
        if ch == '"' || ch == '\'' {
            let mut escaped = false;
            for (_, next) in chars.by_ref() {
                if escaped {
                    escaped = false;
                } else if next == '\\' {
                    escaped = true;
                } else if next == ch {
                    break;
                }
            }
            prev = Some(ch);
            continue;
        }
        if is_ident_char(ch) {
            let mut end = start + ch.len_utf8();
            while let Some(&(idx, next)) = chars.peek() {
                if !is_ident_char(next) {
                    break;
                }
                end = idx + next.len_utf8();
                chars.next();
            }
            if !ch.is_ascii_digit() && prev != Some('.') {
                out.push(&text[start..end]);
            }
            prev = text[..end].chars().next_back();
            continue;
        }
        if !ch.is_whitespace() {
            prev = Some(ch);
        }
    }
    out.into_iter()
}

fn is_ident_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || ch == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedent_then_indent_reflows_a_member() {
        let member = "        void m() {\n            run();\n        }";
        let reflowed = indent_block(&dedent_block(member), "    ");
        assert_eq!(reflowed, "    void m() {\n        run();\n    }");
    }

    #[test]
    fn blank_lines_carry_no_indent() {
        assert_eq!(indent_block("a\n\nb\n", "  "), "  a\n\n  b\n");
    }

    #[test]
    fn leading_indent_requires_whitespace_prefix() {
        let text = "class A {\n    int x;\n}";
        let offset = text.find("int").unwrap();
        assert_eq!(leading_indent(text, offset), Some("    "));
        let brace = text.find('{').unwrap();
        assert_eq!(leading_indent(text, brace), None);
    }

    #[test]
    fn case_helpers() {
        assert_eq!(capitalize("balance"), "Balance");
        assert_eq!(decapitalize("AccountLedger"), "accountLedger");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn identifiers_skip_member_selections_and_literals() {
        let found: Vec<&str> =
            identifiers("limit * Rates.DEFAULT + compute(42) + other. x + \"quoted\"").collect();
        assert_eq!(found, vec!["limit", "Rates", "compute", "other"]);
    }
}
