//! List-in-cell encoding for the `NF/PEDIDO` column.
//!
//! A stock item keeps every purchase-order / invoice reference it received in a
//! single cell, written as a bracketed literal: `[NF 123, PED-9]`. Tokens that
//! would be ambiguous bare (commas, brackets, quotes, backslashes) are
//! single-quoted with backslash escapes, so Python-style `['A', 'B']` cells
//! written by older tools decode too.
//!
//! Decoding is forgiving: a quoted scalar becomes a one-item list, and any
//! other non-empty text that is not a valid list is kept whole as a single
//! legacy reference. Duplicates are dropped, first occurrence wins.
//!
//! References are normalized on the way in: surrounding whitespace is trimmed
//! and blank tokens are dropped, by [`encode`] and [`push_unique`] alike. The
//! round trip `decode(encode(list))` is therefore exact for normalized lists
//! only; `" A"` comes back as `"A"`.

/// Renders a list of references as a single cell value.
pub fn encode(refs: &[String]) -> String {
    let items: Vec<String> = dedup(refs.iter().map(|r| r.trim().to_string()))
        .into_iter()
        .map(|r| encode_token(&r))
        .collect();
    format!("[{}]", items.join(", "))
}

fn encode_token(token: &str) -> String {
    let needs_quotes = token.is_empty()
        || token
            .chars()
            .any(|c| matches!(c, ',' | '[' | ']' | '\'' | '"' | '\\'));
    if !needs_quotes {
        return token.to_string();
    }
    let mut out = String::with_capacity(token.len() + 2);
    out.push('\'');
    for c in token.chars() {
        if c == '\'' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Parses a cell value back into its references.
pub fn decode(cell: &str) -> Vec<String> {
    let text = cell.trim();
    if text.is_empty() {
        return Vec::new();
    }

    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        if let Some(items) = parse_items(inner) {
            return dedup(items);
        }
    } else if let Some(scalar) = parse_quoted_scalar(text) {
        return dedup(std::iter::once(scalar));
    }

    vec![text.to_string()]
}

/// Appends `token` unless already present. Returns whether the list changed.
pub fn push_unique(refs: &mut Vec<String>, token: &str) -> bool {
    let token = token.trim();
    if token.is_empty() || refs.iter().any(|r| r == token) {
        return false;
    }
    refs.push(token.to_string());
    true
}

fn dedup(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

fn parse_quoted_scalar(text: &str) -> Option<String> {
    let mut chars = text.chars().peekable();
    let quote = match chars.peek() {
        Some(&(q @ ('\'' | '"'))) => q,
        _ => return None,
    };
    chars.next();
    let value = read_quoted(&mut chars, quote)?;
    if chars.next().is_some() {
        return None;
    }
    Some(value)
}

fn read_quoted(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, quote: char) -> Option<String> {
    let mut value = String::new();
    loop {
        match chars.next()? {
            '\\' => value.push(chars.next()?),
            c if c == quote => return Some(value),
            c => value.push(c),
        }
    }
}

/// Splits the inside of a bracketed list. `None` on unbalanced quoting.
fn parse_items(inner: &str) -> Option<Vec<String>> {
    let mut items = Vec::new();
    let mut chars = inner.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        match chars.peek() {
            None => break,
            Some(&(q @ ('\'' | '"'))) => {
                chars.next();
                items.push(read_quoted(&mut chars, q)?);
                while chars.peek().is_some_and(|c| c.is_whitespace()) {
                    chars.next();
                }
                match chars.next() {
                    None => break,
                    Some(',') => continue,
                    Some(_) => return None,
                }
            }
            Some(_) => {
                let mut bare = String::new();
                for c in chars.by_ref() {
                    if c == ',' {
                        break;
                    }
                    bare.push(c);
                }
                items.push(bare.trim().to_string());
            }
        }
    }

    Some(items)
}
