use crate::debug::{DiagnosticKind, Diagnostics};
use crate::dom::Node;
use crate::error::FolioError;
use crate::types::{Color, Pt, Size};
use lightningcss::stylesheet::{ParserOptions, PrinterOptions, StyleAttribute};
use std::collections::HashMap;

/// Flat resolved property map for one node. The cascade runs outside this
/// crate; a `StyleResolver` hands these in fully merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleMap {
    props: HashMap<String, String>,
}

impl StyleMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.props.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.props.insert(name.into(), value.into());
    }

    pub fn merge_from(&mut self, other: &StyleMap) {
        for (name, value) in &other.props {
            self.props.insert(name.clone(), value.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    pub fn display(&self) -> Display {
        self.get("display").map(parse_display).unwrap_or(Display::Unset)
    }

    pub fn position(&self) -> Result<Position, FolioError> {
        match self.get("position") {
            Some(value) => parse_position(value),
            None => Ok(Position::Static),
        }
    }

    pub fn length(&self, name: &str) -> Option<Pt> {
        self.get(name).and_then(parse_length)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Display {
    Unset,
    None,
    Block,
    Inline,
    InlineBlock,
    ListItem,
    Table,
}

pub fn parse_display(value: &str) -> Display {
    match value.trim() {
        "none" => Display::None,
        "block" => Display::Block,
        "inline" => Display::Inline,
        "inline-block" => Display::InlineBlock,
        "list-item" => Display::ListItem,
        "table" => Display::Table,
        _ => Display::Unset,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Position {
    Static,
    Relative,
    Absolute,
    Fixed,
    /// `position: running(name)` removes the element from normal flow.
    Running(String),
}

pub fn parse_position(value: &str) -> Result<Position, FolioError> {
    let value = value.trim();
    match value {
        "static" => return Ok(Position::Static),
        "relative" => return Ok(Position::Relative),
        "absolute" => return Ok(Position::Absolute),
        "fixed" => return Ok(Position::Fixed),
        _ => {}
    }
    if let Some(rest) = value.strip_prefix("running(") {
        let name = rest.strip_suffix(')').map(str::trim).unwrap_or("");
        if name.is_empty() || !name.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_') {
            return Err(FolioError::InvalidRunningName(value.to_string()));
        }
        return Ok(Position::Running(name.to_string()));
    }
    Ok(Position::Static)
}

/// Absolute CSS lengths to points. `px` at the CSS ratio of 0.75pt, the same
/// table the rest of the engine uses for inline dimensions.
pub fn parse_length(raw: &str) -> Option<Pt> {
    let raw = raw.trim();
    if raw == "0" {
        return Some(Pt::ZERO);
    }
    let units = ["px", "pt", "pc", "in", "cm", "mm"];
    for unit in units {
        if let Some(number) = raw.strip_suffix(unit) {
            let v: f32 = number.trim().parse().ok()?;
            let factor = match unit {
                "px" => 0.75,
                "pc" => 12.0,
                "in" => 72.0,
                "cm" => 72.0 / 2.54,
                "mm" => 72.0 / 25.4,
                _ => 1.0, // pt
            };
            return Some(Pt::from_f32(v * factor));
        }
    }
    None
}

pub fn parse_color(raw: &str) -> Option<Color> {
    let raw = raw.trim();
    if let Some(hex) = raw.strip_prefix('#') {
        let expand = |c: u8| ((c as char).to_digit(16).unwrap_or(0) * 17) as f32 / 255.0;
        let pair = |a: &str| u8::from_str_radix(a, 16).ok().map(|v| v as f32 / 255.0);
        return match hex.len() {
            3 => {
                let bytes = hex.as_bytes();
                Some(Color::rgb(expand(bytes[0]), expand(bytes[1]), expand(bytes[2])))
            }
            6 => Some(Color::rgb(
                pair(&hex[0..2])?,
                pair(&hex[2..4])?,
                pair(&hex[4..6])?,
            )),
            _ => None,
        };
    }
    match raw {
        "black" => Some(Color::BLACK),
        "white" => Some(Color::rgb(1.0, 1.0, 1.0)),
        "red" => Some(Color::rgb(1.0, 0.0, 0.0)),
        "green" => Some(Color::rgb(0.0, 0.5, 0.0)),
        "blue" => Some(Color::rgb(0.0, 0.0, 1.0)),
        "gray" | "grey" => Some(Color::rgb(0.5, 0.5, 0.5)),
        _ => None,
    }
}

fn named_page_size(name: &str) -> Option<Size> {
    Some(match name {
        "a5" => Size::from_mm(148.0, 210.0),
        "a4" => Size::a4(),
        "a3" => Size::from_mm(297.0, 420.0),
        "b5" => Size::from_mm(176.0, 250.0),
        "b4" => Size::from_mm(250.0, 353.0),
        "letter" => Size::letter(),
        "legal" => Size::new(Pt::from_f32(612.0), Pt::from_f32(1008.0)),
        "ledger" => Size::new(Pt::from_f32(1224.0), Pt::from_f32(792.0)),
        "tabloid" => Size::new(Pt::from_f32(792.0), Pt::from_f32(1224.0)),
        "executive" => Size::new(Pt::from_f32(522.0), Pt::from_f32(756.0)),
        _ => return None,
    })
}

/// `@page size` resolution. Precedence: explicit length(s), then named size
/// with an optional orientation keyword (rotating only when needed), then the
/// caller default. Values that look plausible but resolve to nothing are
/// reported and fall back to the default.
pub fn parse_page_size(raw: &str, default: Size, diagnostics: &Diagnostics) -> Size {
    let raw = raw.trim();
    if raw.is_empty() || raw == "auto" {
        return default;
    }
    let tokens: Vec<&str> = raw.split_whitespace().collect();

    let lengths: Vec<Pt> = tokens.iter().filter_map(|t| parse_length(t)).collect();
    if lengths.len() == 2 {
        return Size::new(lengths[0], lengths[1]);
    }
    if lengths.len() == 1 && tokens.len() == 1 {
        return Size::new(lengths[0], lengths[0]);
    }

    let mut named = None;
    let mut orientation = None;
    for token in &tokens {
        let token = token.to_ascii_lowercase();
        match token.as_str() {
            "landscape" => orientation = Some(true),
            "portrait" => orientation = Some(false),
            other => {
                if let Some(size) = named_page_size(other) {
                    named = Some(size);
                }
            }
        }
    }
    if let Some(mut size) = named {
        if let Some(landscape) = orientation {
            if size.is_landscape() != landscape {
                size = size.rotated();
            }
        }
        return size;
    }

    diagnostics.report(
        DiagnosticKind::UnparseablePageValue,
        format!("size: {}", raw),
    );
    default
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterStyle {
    Decimal,
    LowerRoman,
    UpperRoman,
    LowerAlpha,
    UpperAlpha,
}

impl CounterStyle {
    fn parse(raw: &str) -> CounterStyle {
        match raw.trim() {
            "lower-roman" => CounterStyle::LowerRoman,
            "upper-roman" => CounterStyle::UpperRoman,
            "lower-alpha" | "lower-latin" => CounterStyle::LowerAlpha,
            "upper-alpha" | "upper-latin" => CounterStyle::UpperAlpha,
            _ => CounterStyle::Decimal,
        }
    }
}

/// One token of a `content:` value after resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentPiece {
    Text(String),
    Counter {
        name: String,
        style: CounterStyle,
    },
    /// `element(name, policy)` margin-box reference to a running element.
    RunningRef {
        name: String,
        policy: String,
    },
    /// `target-counter(attr(href), name)`; the target is kept raw and
    /// resolved against the link-destination index after layout.
    TargetCounter {
        target: String,
        name: String,
        style: CounterStyle,
    },
    Attr(String),
}

/// Tokenize a `content:` value. Unknown functions and keywords are skipped;
/// `none`/`normal` yield an empty list.
pub fn parse_content(raw: &str) -> Vec<ContentPiece> {
    let raw = raw.trim();
    if raw.is_empty() || raw == "none" || raw == "normal" {
        return Vec::new();
    }
    let mut pieces = Vec::new();
    let chars: Vec<char> = raw.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '"' || c == '\'' {
            let quote = c;
            let mut text = String::new();
            i += 1;
            while i < chars.len() && chars[i] != quote {
                text.push(chars[i]);
                i += 1;
            }
            i += 1;
            pieces.push(ContentPiece::Text(text));
            continue;
        }
        // Bare token up to whitespace, capturing any balanced parentheses.
        let mut token = String::new();
        let mut depth = 0usize;
        while i < chars.len() {
            let ch = chars[i];
            if ch.is_whitespace() && depth == 0 {
                break;
            }
            if ch == '(' {
                depth += 1;
            }
            if ch == ')' {
                depth = depth.saturating_sub(1);
            }
            token.push(ch);
            i += 1;
        }
        if let Some(piece) = parse_content_function(&token) {
            pieces.push(piece);
        }
    }
    pieces
}

fn parse_content_function(token: &str) -> Option<ContentPiece> {
    let (func, args) = split_function(token)?;
    let parts: Vec<String> = split_args(&args);
    match func.as_str() {
        "counter" | "counters" => {
            let name = parts.first()?.clone();
            let style = parts
                .iter()
                .skip(1)
                .last()
                .map(|s| CounterStyle::parse(s))
                .unwrap_or(CounterStyle::Decimal);
            Some(ContentPiece::Counter { name, style })
        }
        "element" => {
            let name = parts.first()?.clone();
            let policy = parts.get(1).cloned().unwrap_or_else(|| "first".to_string());
            Some(ContentPiece::RunningRef { name, policy })
        }
        "target-counter" => {
            let target = parts.first()?.clone();
            let name = parts.get(1)?.clone();
            let style = parts
                .get(2)
                .map(|s| CounterStyle::parse(s))
                .unwrap_or(CounterStyle::Decimal);
            Some(ContentPiece::TargetCounter {
                target,
                name,
                style,
            })
        }
        "attr" => Some(ContentPiece::Attr(parts.first()?.clone())),
        _ => None,
    }
}

fn split_function(token: &str) -> Option<(String, String)> {
    let open = token.find('(')?;
    if !token.ends_with(')') {
        return None;
    }
    let func = token[..open].trim().to_ascii_lowercase();
    let args = token[open + 1..token.len() - 1].to_string();
    Some((func, args))
}

fn split_args(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for ch in args.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            ',' if depth == 0 => {
                out.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

/// External style-resolution seam. The cascade (stylesheets, inheritance,
/// specificity) runs in the collaborator; folio calls this once per node per
/// pass and receives a flat merged map.
pub trait StyleResolver {
    fn resolve(&self, node: &Node) -> StyleMap;

    /// Resolved declarations for a pseudo-element of `node`, or `None` when
    /// the stylesheet declares nothing for that position.
    fn resolve_pseudo(&self, _node: &Node, _pseudo: &str) -> Option<StyleMap> {
        None
    }
}

/// Bundled resolver covering the inline-style path: per-tag display defaults,
/// inheritance of the inheritable subset from the parent's resolved map, and
/// the element's `style` attribute parsed through lightningcss.
#[derive(Default)]
pub struct InlineStyleResolver;

const INHERITED_PROPS: &[&str] = &["color", "font-size", "font-family", "text-align"];

impl StyleResolver for InlineStyleResolver {
    fn resolve(&self, node: &Node) -> StyleMap {
        let mut styles = StyleMap::new();
        let Some(tag) = node.tag() else {
            return styles;
        };
        styles.set("display", default_display(&tag));
        if let Some(parent) = node.parent() {
            if let Some(parent_styles) = parent.resolved_style() {
                for prop in INHERITED_PROPS {
                    if let Some(value) = parent_styles.get(prop) {
                        styles.set(*prop, value);
                    }
                }
            }
        }
        if let Some(inline) = node.attr("style") {
            apply_style_attribute(&inline, &mut styles);
        }
        styles
    }
}

fn default_display(tag: &str) -> &'static str {
    match tag {
        "head" | "script" | "style" | "title" | "meta" | "link" | "template" => "none",
        "span" | "a" | "b" | "i" | "u" | "em" | "strong" | "small" | "sub" | "sup" | "code"
        | "label" | "img" | "input" | "textarea" | "select" | "button" | "br" => "inline",
        "li" => "list-item",
        "table" => "table",
        _ => "block",
    }
}

/// Parse a `style="..."` attribute into flat name/value pairs. Goes through
/// lightningcss for canonical values, with a raw pre-scan so paged-media
/// declarations lightningcss does not model (`position: running(...)`,
/// `content`, `counter-*`) survive with their literal text.
pub fn apply_style_attribute(style: &str, out: &mut StyleMap) {
    for declaration in style.split(';') {
        if let Some((name, value)) = declaration.split_once(':') {
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim();
            if !name.is_empty() && !value.is_empty() {
                out.set(name, value);
            }
        }
    }
    let parsed = match StyleAttribute::parse(style, ParserOptions::default()) {
        Ok(value) => value,
        Err(_) => return,
    };
    for prop in parsed
        .declarations
        .declarations
        .iter()
        .chain(parsed.declarations.important_declarations.iter())
    {
        let name = prop.property_id().name().to_string();
        if let Ok(value) = prop.value_to_css_string(PrinterOptions::default()) {
            out.set(name, value);
        }
    }
}
