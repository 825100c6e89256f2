use crate::style::{CounterStyle, StyleMap};
use std::collections::HashMap;

/// Scoped CSS counters plus the page/pages side channel.
///
/// `counter-reset` opens a nested value in the scope it appears in;
/// `counter-increment` bumps the innermost value. Scopes are pushed when the
/// walker enters an element and popped when it leaves, so reads inside a
/// subtree see the values document order has produced so far.
#[derive(Debug, Default)]
pub struct CounterManager {
    scopes: HashMap<String, Vec<i64>>,
    // Names reset by each open element, innermost last, so pops are paired.
    resets: Vec<Vec<String>>,
    current_page: usize,
    total_pages: usize,
    pages_referenced: bool,
}

impl CounterManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter an element: apply its `counter-reset` / `counter-increment`
    /// declarations in that order, as the cascade resolved them.
    pub fn process_counters(&mut self, styles: &StyleMap) {
        let mut opened = Vec::new();
        if let Some(resets) = styles.get("counter-reset") {
            for (name, value) in parse_counter_list(resets, 0) {
                self.scopes.entry(name.clone()).or_default().push(value);
                opened.push(name);
            }
        }
        if let Some(increments) = styles.get("counter-increment") {
            for (name, delta) in parse_counter_list(increments, 1) {
                let stack = self.scopes.entry(name).or_insert_with(|| vec![0]);
                if let Some(top) = stack.last_mut() {
                    *top += delta;
                }
            }
        }
        self.resets.push(opened);
    }

    /// Leave an element: close every scope it opened.
    pub fn end_scope(&mut self) {
        if let Some(opened) = self.resets.pop() {
            for name in opened {
                if let Some(stack) = self.scopes.get_mut(&name) {
                    stack.pop();
                }
            }
        }
    }

    pub fn value(&mut self, name: &str) -> i64 {
        match name {
            "page" => self.current_page as i64,
            "pages" => {
                self.pages_referenced = true;
                self.total_pages.max(1) as i64
            }
            _ => self
                .scopes
                .get(name)
                .and_then(|stack| stack.last().copied())
                .unwrap_or(0),
        }
    }

    pub fn set_current_page(&mut self, page: usize) {
        self.current_page = page;
    }

    pub fn set_total_pages(&mut self, total: usize) {
        self.total_pages = total;
    }

    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Whether any `content:` expression read the `pages` counter since the
    /// last reset. Drives the relayout loop.
    pub fn pages_referenced(&self) -> bool {
        self.pages_referenced
    }

    /// Fresh state for the next walk pass. The page totals survive so the
    /// next pass resolves `pages` against the previous layout.
    pub fn reset_for_pass(&mut self) {
        self.scopes.clear();
        self.resets.clear();
        self.current_page = 0;
        self.pages_referenced = false;
    }
}

fn parse_counter_list(raw: &str, default_value: i64) -> Vec<(String, i64)> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "none" {
        return Vec::new();
    }
    let mut out: Vec<(String, i64)> = Vec::new();
    for token in raw.split_whitespace() {
        if let Ok(value) = token.parse::<i64>() {
            if let Some(last) = out.last_mut() {
                last.1 = value;
            }
        } else {
            out.push((token.to_string(), default_value));
        }
    }
    out
}

pub fn format_counter(value: i64, style: CounterStyle) -> String {
    match style {
        CounterStyle::Decimal => value.to_string(),
        CounterStyle::LowerRoman => to_roman(value).to_lowercase(),
        CounterStyle::UpperRoman => to_roman(value),
        CounterStyle::LowerAlpha => to_alpha(value),
        CounterStyle::UpperAlpha => to_alpha(value).to_uppercase(),
    }
}

fn to_roman(value: i64) -> String {
    if value <= 0 || value > 3999 {
        return value.to_string();
    }
    const TABLE: &[(i64, &str)] = &[
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut rest = value;
    let mut out = String::new();
    for (step, glyph) in TABLE {
        while rest >= *step {
            out.push_str(glyph);
            rest -= step;
        }
    }
    out
}

fn to_alpha(value: i64) -> String {
    if value <= 0 {
        return value.to_string();
    }
    let mut rest = value;
    let mut out = Vec::new();
    while rest > 0 {
        rest -= 1;
        out.push(b'a' + (rest % 26) as u8);
        rest /= 26;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}
