use crate::types::{Color, Pt, Size};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EdgeSizes {
    pub top: Pt,
    pub right: Pt,
    pub bottom: Pt,
    pub left: Pt,
}

impl EdgeSizes {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn horizontal(&self) -> Pt {
        self.left + self.right
    }

    pub fn vertical(&self) -> Pt {
        self.top + self.bottom
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BreakRule {
    #[default]
    Auto,
    Always,
    Avoid,
    Left,
    Right,
    Page,
}

impl BreakRule {
    pub fn parse(raw: &str) -> BreakRule {
        match raw.trim() {
            "always" => BreakRule::Always,
            "avoid" | "avoid-page" => BreakRule::Avoid,
            "left" => BreakRule::Left,
            "right" => BreakRule::Right,
            "page" => BreakRule::Page,
            _ => BreakRule::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Block,
    Inline,
    Text,
    LineBreak,
    FormField,
    /// Stand-in left behind when an element is pulled out of normal flow by
    /// `position: running(...)`.
    RunningPlaceholder,
}

/// One node of the output forest: a layout element carrying the box-model
/// properties the pagination engine consumes.
#[derive(Debug, Clone)]
pub struct LayoutElement {
    pub kind: ElementKind,
    pub tag: String,
    pub text: Option<String>,
    pub children: Vec<LayoutElement>,
    pub margins: EdgeSizes,
    pub paddings: EdgeSizes,
    pub border_widths: EdgeSizes,
    pub border_color: Option<Color>,
    pub background: Option<Color>,
    pub font_size: Pt,
    pub width: Option<Pt>,
    pub height: Option<Pt>,
    pub min_width: Option<Pt>,
    pub max_width: Option<Pt>,
    pub min_height: Option<Pt>,
    pub max_height: Option<Pt>,
    pub break_before: BreakRule,
    pub break_after: BreakRule,
    pub break_inside: BreakRule,
    /// Top-level only: glue this root to the previous one across page breaks.
    pub keep_with_previous: bool,
    /// Disables margin collapsing; set on accessibility-flattened containers.
    pub continuous_container: bool,
    /// Form controls expose the slot their synthesized ::placeholder fills.
    pub placeholder: Option<Box<LayoutElement>>,
    /// Anchor name this element registered (`id` attribute).
    pub destination: Option<String>,
    /// Link target of an `<a href>` element.
    pub link_target: Option<String>,
    /// For `RunningPlaceholder` elements: the (name, occurrence ordinal) the
    /// extracted element was registered under, so the pagination side can
    /// assign it the page this placeholder lands on.
    pub running_ref: Option<(String, usize)>,
}

impl LayoutElement {
    pub fn new(kind: ElementKind, tag: impl Into<String>) -> Self {
        Self {
            kind,
            tag: tag.into(),
            text: None,
            children: Vec::new(),
            margins: EdgeSizes::zero(),
            paddings: EdgeSizes::zero(),
            border_widths: EdgeSizes::zero(),
            border_color: None,
            background: None,
            font_size: Pt::from_f32(12.0),
            width: None,
            height: None,
            min_width: None,
            max_width: None,
            min_height: None,
            max_height: None,
            break_before: BreakRule::Auto,
            break_after: BreakRule::Auto,
            break_inside: BreakRule::Auto,
            keep_with_previous: false,
            continuous_container: false,
            placeholder: None,
            destination: None,
            link_target: None,
            running_ref: None,
        }
    }

    pub fn text_leaf(text: impl Into<String>) -> Self {
        let mut el = LayoutElement::new(ElementKind::Text, crate::dom::TAG_TEXT);
        el.text = Some(text.into());
        el
    }

    pub fn push_child(&mut self, child: LayoutElement) {
        self.children.push(child);
    }

    /// Concatenated text of this element and its descendants, in order.
    pub fn collected_text(&self) -> String {
        let mut out = String::new();
        self.collect_text_into(&mut out);
        out
    }

    fn collect_text_into(&self, out: &mut String) {
        if let Some(text) = &self.text {
            out.push_str(text);
        }
        for child in &self.children {
            child.collect_text_into(out);
        }
    }

    pub fn descendant_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(LayoutElement::descendant_count)
            .sum::<usize>()
    }
}

/// External box-layout seam. Measuring may be expensive (full tree layout)
/// but is a synchronous black box from this crate's point of view.
pub trait LayoutEngine {
    /// Occupied size of `element` laid out inside `constraints`.
    fn measure(&self, element: &LayoutElement, constraints: Size) -> Size;

    /// Distribute the root forest over pages of the given content size,
    /// returning the root indices placed on each page.
    fn paginate(&self, roots: &[LayoutElement], content_size: Size) -> Vec<Vec<usize>> {
        let mut pages: Vec<Vec<usize>> = Vec::new();
        let mut current: Vec<usize> = Vec::new();
        let mut used = Pt::ZERO;
        for (index, root) in roots.iter().enumerate() {
            let size = self.measure(root, content_size);
            let breaks_first = matches!(
                root.break_before,
                BreakRule::Always | BreakRule::Page | BreakRule::Left | BreakRule::Right
            );
            let overflows = used + size.height > content_size.height && !current.is_empty();
            if (breaks_first || overflows) && !(overflows && root.keep_with_previous) {
                if !current.is_empty() {
                    pages.push(std::mem::take(&mut current));
                    used = Pt::ZERO;
                }
            }
            current.push(index);
            used += size.height;
        }
        if !current.is_empty() {
            pages.push(current);
        }
        if pages.is_empty() {
            pages.push(Vec::new());
        }
        pages
    }
}

/// Deterministic character-metric engine used for margin-box measurement and
/// in tests. Real conversions plug a full layout engine in instead.
#[derive(Debug, Clone)]
pub struct BasicLayoutEngine {
    /// Average glyph advance as a fraction of the font size.
    pub glyph_ratio: f32,
    pub line_height_ratio: f32,
}

impl Default for BasicLayoutEngine {
    fn default() -> Self {
        Self {
            glyph_ratio: 0.5,
            line_height_ratio: 1.2,
        }
    }
}

impl LayoutEngine for BasicLayoutEngine {
    fn measure(&self, element: &LayoutElement, constraints: Size) -> Size {
        let text = element.collected_text();
        let font_size = element.font_size;
        let glyph = font_size * self.glyph_ratio;
        let line = font_size * self.line_height_ratio;

        let chrome_w = element.margins.horizontal()
            + element.paddings.horizontal()
            + element.border_widths.horizontal();
        let chrome_h = element.margins.vertical()
            + element.paddings.vertical()
            + element.border_widths.vertical();

        let natural_width = glyph * text.chars().count() as f32;
        let inner_avail = (constraints.width - chrome_w).max(Pt::ZERO);
        let mut width = match element.width {
            Some(w) => w,
            None => natural_width.min(inner_avail),
        };
        width = clamp_opt(width, element.min_width, element.max_width);

        let lines = if text.is_empty() {
            if element.children.is_empty() { 0 } else { 1 }
        } else if width.is_zero() || inner_avail.is_zero() {
            1
        } else {
            let per_line = (width.to_f32() / glyph.to_f32().max(0.01)).floor().max(1.0) as usize;
            text.chars().count().div_ceil(per_line)
        };
        let mut height = match element.height {
            Some(h) => h,
            None => line * lines as f32,
        };
        height = clamp_opt(height, element.min_height, element.max_height);

        Size::new(width + chrome_w, height + chrome_h)
    }
}

fn clamp_opt(value: Pt, min: Option<Pt>, max: Option<Pt>) -> Pt {
    let mut value = value;
    if let Some(max) = max {
        value = value.min(max);
    }
    if let Some(min) = min {
        value = value.max(min);
    }
    value
}
