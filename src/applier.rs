use crate::element::{BreakRule, EdgeSizes, LayoutElement};
use crate::style::{StyleMap, parse_color, parse_length};
use crate::types::Pt;
use std::collections::HashMap;

pub type StyleApplier = Box<dyn Fn(&StyleMap, &mut LayoutElement)>;

/// Parallel lookup to the worker registry: after a worker finishes, the
/// applier for its tag copies resolved properties onto the produced element.
pub struct StyleApplierRegistry {
    appliers: HashMap<String, StyleApplier>,
}

impl StyleApplierRegistry {
    pub fn empty() -> Self {
        Self {
            appliers: HashMap::new(),
        }
    }

    pub fn register(&mut self, tag: &str, applier: StyleApplier) {
        self.appliers.insert(tag.to_string(), applier);
    }

    pub fn apply(&self, tag: &str, styles: &StyleMap, element: &mut LayoutElement) -> bool {
        match self.appliers.get(tag) {
            Some(applier) => {
                applier(styles, element);
                true
            }
            None => false,
        }
    }
}

/// Expand a 1..4 value shorthand into [top, right, bottom, left].
fn expand_shorthand(raw: &str) -> [Pt; 4] {
    let values: Vec<Pt> = raw.split_whitespace().filter_map(parse_length).collect();
    match values.as_slice() {
        [all] => [*all; 4],
        [v, h] => [*v, *h, *v, *h],
        [t, h, b] => [*t, *h, *b, *h],
        [t, r, b, l] => [*t, *r, *b, *l],
        _ => [Pt::ZERO; 4],
    }
}

fn edge_sizes(styles: &StyleMap, prefix: &str, suffix: &str) -> EdgeSizes {
    let shorthand = styles
        .get(prefix)
        .map(expand_shorthand)
        .unwrap_or([Pt::ZERO; 4]);
    let get = |side: &str, index: usize| {
        let name = if suffix.is_empty() {
            format!("{}-{}", prefix, side)
        } else {
            format!("{}-{}-{}", prefix, side, suffix)
        };
        styles
            .get(&name)
            .and_then(parse_length)
            .unwrap_or(shorthand[index])
    };
    EdgeSizes {
        top: get("top", 0),
        right: get("right", 1),
        bottom: get("bottom", 2),
        left: get("left", 3),
    }
}

/// Box-model and fragmentation properties shared by every element family.
pub fn apply_common(styles: &StyleMap, element: &mut LayoutElement) {
    element.margins = edge_sizes(styles, "margin", "");
    element.paddings = edge_sizes(styles, "padding", "");
    element.border_widths = edge_sizes(styles, "border", "width");
    if let Some(color) = styles.get("border-color").and_then(parse_color) {
        element.border_color = Some(color);
    }
    if let Some(color) = styles
        .get("background-color")
        .or_else(|| styles.get("background"))
        .and_then(parse_color)
    {
        element.background = Some(color);
    }
    if let Some(size) = styles.length("font-size") {
        element.font_size = size;
    }
    element.width = styles.length("width");
    element.height = styles.length("height");
    element.min_width = styles.length("min-width");
    element.max_width = styles.length("max-width");
    element.min_height = styles.length("min-height");
    element.max_height = styles.length("max-height");

    let break_value = |long: &str, legacy: &str| {
        styles
            .get(long)
            .or_else(|| styles.get(legacy))
            .map(BreakRule::parse)
            .unwrap_or_default()
    };
    element.break_before = break_value("break-before", "page-break-before");
    element.break_after = break_value("break-after", "page-break-after");
    element.break_inside = break_value("break-inside", "page-break-inside");
    // keep-with-previous is meaningful on top-level elements only; the
    // pagination side ignores it elsewhere.
    element.keep_with_previous = matches!(element.break_before, BreakRule::Avoid);
}

pub fn default_appliers() -> StyleApplierRegistry {
    let mut registry = StyleApplierRegistry::empty();
    let block_tags = [
        "div", "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "section", "article",
        "header", "footer", "main", "nav", "aside", "blockquote", "pre", "table", "figure",
        "figcaption", "address", "hr",
    ];
    for tag in block_tags {
        registry.register(tag, Box::new(apply_common));
    }
    // html/body act as continuous containers: accessibility flattening must
    // not reintroduce collapsed margins between their children.
    for tag in ["html", "body"] {
        registry.register(
            tag,
            Box::new(|styles, element| {
                apply_common(styles, element);
                element.continuous_container = true;
            }),
        );
    }
    let inline_tags = [
        "span", "a", "b", "i", "u", "em", "strong", "small", "sub", "sup", "code", "label", "q",
        "cite", "abbr", "mark", "time", "br", "input", "textarea",
        crate::dom::TAG_BEFORE,
        crate::dom::TAG_AFTER,
        crate::dom::TAG_PLACEHOLDER,
    ];
    for tag in inline_tags {
        registry.register(tag, Box::new(apply_common));
    }
    registry
}
