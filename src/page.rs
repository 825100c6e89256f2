use crate::canvas::Page;
use crate::counters::format_counter;
use crate::debug::{DiagnosticKind, Diagnostics};
use crate::element::{BreakRule, ElementKind, LayoutElement, LayoutEngine};
use crate::error::FolioError;
use crate::margin_boxes::{
    CORNER_SLOTS, Edge, MARGIN_BOX_NAMES, MarginArea, SlotConstraints, slot_index, solve_edge,
};
use crate::running::Occurrence;
use crate::style::{ContentPiece, StyleMap, parse_color, parse_content, parse_length, parse_page_size};
use crate::types::{Color, Margins, Pt, Rect, Size};
use crate::walker::ProcessorContext;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageClass {
    First,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSelector {
    First,
    Left,
    Right,
}

/// One `@page` rule as extracted by the CSS collaborator: an optional page
/// selector, the rule's declarations, and its nested margin-box blocks.
#[derive(Debug, Clone, Default)]
pub struct PageRule {
    pub selector: Option<PageSelector>,
    pub declarations: StyleMap,
    pub margin_boxes: HashMap<String, StyleMap>,
}

/// Resolved `@page` properties for one page class, including a declaration
/// block per margin box that actually has generated content. Boxes without
/// content are absent and never occupy space.
#[derive(Debug, Clone)]
pub struct PageContextProperties {
    pub class: PageClass,
    pub styles: StyleMap,
    pub margin_boxes: [Option<StyleMap>; 16],
}

const NO_BOX: Option<StyleMap> = None;

/// Merge the rule list into first/left/right property sets. Base rules
/// (no selector) apply everywhere; class rules win in declaration order.
pub fn resolve_page_contexts(rules: &[PageRule]) -> [PageContextProperties; 3] {
    let build = |class: PageClass, selector: PageSelector| {
        let mut styles = StyleMap::new();
        let mut margin_boxes = [NO_BOX; 16];
        // two sweeps: base rules first, then class-specific rules
        for class_pass in [false, true] {
            for rule in rules {
                let applies = match rule.selector {
                    None => !class_pass,
                    Some(s) => class_pass && s == selector,
                };
                if !applies {
                    continue;
                }
                styles.merge_from(&rule.declarations);
                for (name, declarations) in &rule.margin_boxes {
                    let Some(slot) = slot_index(name) else {
                        continue;
                    };
                    let has_content = declarations
                        .get("content")
                        .map(|c| !parse_content(c).is_empty())
                        .unwrap_or(false);
                    if has_content {
                        margin_boxes[slot] = Some(declarations.clone());
                    }
                }
            }
        }
        PageContextProperties {
            class,
            styles,
            margin_boxes,
        }
    };
    [
        build(PageClass::First, PageSelector::First),
        build(PageClass::Left, PageSelector::Left),
        build(PageClass::Right, PageSelector::Right),
    ]
}

/// Left/right alternation. Page one is a right page unless a
/// `break-before: left` on the very first content flips the evenness
/// baseline; no throwaway blank page is ever materialized for this.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageParity {
    flipped: bool,
}

impl PageParity {
    pub fn from_flow(flow: &[LayoutElement]) -> Self {
        let flipped = flow
            .first()
            .map(|root| root.break_before == BreakRule::Left)
            .unwrap_or(false);
        Self { flipped }
    }

    pub fn side_for(&self, page_number: usize) -> PageClass {
        let odd = page_number % 2 == 1;
        if odd != self.flipped {
            PageClass::Right
        } else {
            PageClass::Left
        }
    }
}

struct MarginBoxSlot {
    slot: usize,
    declarations: StyleMap,
}

/// Per-page-class decoration state machine. `reset` derives everything from
/// the resolved `@page` styles; `process_new_page` and `process_page_end`
/// run per concrete page.
pub struct PageContextProcessor {
    props: PageContextProperties,
    diagnostics: Diagnostics,
    page_size: Size,
    bleed: Pt,
    marks_crop: bool,
    marks_cross: bool,
    margins: Margins,
    border_width: Pt,
    border_color: Option<Color>,
    background: Option<Color>,
    area: MarginArea,
    boxes: Vec<MarginBoxSlot>,
}

impl PageContextProcessor {
    pub fn new(
        props: PageContextProperties,
        diagnostics: Diagnostics,
        default_size: Size,
        default_margins: Margins,
    ) -> Self {
        let mut processor = Self {
            props,
            diagnostics,
            page_size: default_size,
            bleed: Pt::ZERO,
            marks_crop: false,
            marks_cross: false,
            margins: default_margins,
            border_width: Pt::ZERO,
            border_color: None,
            background: None,
            area: MarginArea::new(default_size, default_margins),
            boxes: Vec::new(),
        };
        processor.reset(default_size, default_margins);
        processor
    }

    /// Re-derive size, bleed, marks, margins, border, background, and the
    /// populated margin-box set. Called at the start of every layout pass.
    pub fn reset(&mut self, default_size: Size, default_margins: Margins) {
        let styles = &self.props.styles;
        self.page_size = styles
            .get("size")
            .map(|raw| parse_page_size(raw, default_size, &self.diagnostics))
            .unwrap_or(default_size);
        self.bleed = match styles.get("bleed") {
            Some("auto") | None => Pt::ZERO,
            Some(raw) => parse_length(raw).unwrap_or_else(|| {
                self.diagnostics.report(
                    DiagnosticKind::UnparseablePageValue,
                    format!("bleed: {}", raw),
                );
                Pt::ZERO
            }),
        };
        let marks = styles.get("marks").unwrap_or("");
        self.marks_crop = marks.contains("crop");
        self.marks_cross = marks.contains("cross");
        let margin_for = |side: &str, fallback: Pt| {
            styles
                .get(&format!("margin-{}", side))
                .or_else(|| styles.get("margin"))
                .and_then(parse_length)
                .unwrap_or(fallback)
        };
        self.margins = Margins {
            top: margin_for("top", default_margins.top),
            right: margin_for("right", default_margins.right),
            bottom: margin_for("bottom", default_margins.bottom),
            left: margin_for("left", default_margins.left),
        };
        self.border_width = styles.length("border-width").unwrap_or(Pt::ZERO);
        self.border_color = styles.get("border-color").and_then(parse_color);
        self.background = styles
            .get("background-color")
            .or_else(|| styles.get("background"))
            .and_then(parse_color);
        self.area = MarginArea::new(self.page_size, self.margins);
        self.boxes = self
            .props
            .margin_boxes
            .iter()
            .enumerate()
            .filter_map(|(slot, declarations)| {
                declarations.as_ref().map(|declarations| MarginBoxSlot {
                    slot,
                    declarations: declarations.clone(),
                })
            })
            .collect();
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    pub fn margins(&self) -> Margins {
        self.margins
    }

    pub fn content_size(&self) -> Size {
        Size::new(
            self.page_size.width - self.margins.left - self.margins.right,
            self.page_size.height - self.margins.top - self.margins.bottom,
        )
    }

    /// One-time page setup: bleed expansion of the physical page box, then
    /// printer marks and the page border.
    pub fn process_new_page(&self, page: &mut Page) {
        let trim = Rect::new(Pt::ZERO, Pt::ZERO, self.page_size.width, self.page_size.height);
        page.trim_box = trim;
        page.bleed_box = trim.expanded(self.bleed);
        page.media_box = page.bleed_box;
        if self.marks_crop || self.marks_cross {
            // marks live outside the bleed area
            page.media_box = page.bleed_box.expanded(mark_zone());
        }
        if self.marks_crop {
            self.draw_crop_marks(page);
        }
        if self.marks_cross {
            self.draw_cross_marks(page);
        }
        if self.border_width > Pt::ZERO {
            let canvas = &mut page.content;
            canvas.draw_box(trim, None, self.border_width, self.border_color);
        }
    }

    fn draw_crop_marks(&self, page: &mut Page) {
        let trim = page.trim_box;
        let gap = self.bleed.max(Pt::from_f32(4.0));
        let len = mark_zone();
        let width = Pt::from_f32(0.5);
        let canvas = &mut page.content;
        let xs = [trim.x, trim.right()];
        let ys = [trim.y, trim.bottom()];
        for x in xs {
            for y in ys {
                // one horizontal and one vertical tick per corner
                let dir_x = if x == trim.x { -1.0 } else { 1.0 };
                let dir_y = if y == trim.y { -1.0 } else { 1.0 };
                canvas.draw_line(
                    (x + gap * dir_x, y),
                    (x + (gap + len) * dir_x, y),
                    width,
                );
                canvas.draw_line(
                    (x, y + gap * dir_y),
                    (x, y + (gap + len) * dir_y),
                    width,
                );
            }
        }
    }

    fn draw_cross_marks(&self, page: &mut Page) {
        let trim = page.trim_box;
        let offset = self.bleed + mark_zone() / 2;
        let arm = Pt::from_f32(4.0);
        let width = Pt::from_f32(0.5);
        let canvas = &mut page.content;
        let centers = [
            (trim.x + trim.width / 2, trim.y - offset),
            (trim.x + trim.width / 2, trim.bottom() + offset),
            (trim.x - offset, trim.y + trim.height / 2),
            (trim.right() + offset, trim.y + trim.height / 2),
        ];
        for (cx, cy) in centers {
            canvas.draw_line((cx - arm, cy), (cx + arm, cy), width);
            canvas.draw_line((cx, cy - arm), (cx, cy + arm), width);
        }
    }

    /// Paint the page background into a stream inserted before normal
    /// content and hand the stream handle back so html/body background
    /// simulation can draw into the same layer.
    pub fn draw_page_background(&self, page: &mut Page) -> usize {
        let handle = page.new_content_stream_before();
        if let Some(color) = self.background {
            let rect = page.bleed_box;
            page.before_mut(handle).draw_box(rect, Some(color), Pt::ZERO, None);
        }
        handle
    }

    /// Finalize and draw every populated margin box for a concrete page.
    /// Runs strictly after the page's normal-flow content, because content
    /// here may reference running elements and late-bound counters.
    pub fn process_page_end(
        &self,
        page_number: usize,
        page: &mut Page,
        ctx: &mut ProcessorContext,
        engine: &dyn LayoutEngine,
    ) -> Result<(), FolioError> {
        let handle = page.new_content_stream_after();

        // corners first: sized directly from the margins, never solved
        let mut corner_elements: Vec<(Rect, LayoutElement)> = Vec::new();
        for slot in CORNER_SLOTS {
            let Some(content) = self.box_content(slot, page_number, ctx)? else {
                continue;
            };
            let Some(rect) = self.area.corner_rect(slot) else {
                continue;
            };
            // boxes sized down to nothing are dropped from rendering
            if rect.width.to_milli_i64() == 0 || rect.height.to_milli_i64() == 0 {
                continue;
            }
            corner_elements.push((rect, content));
        }

        let mut edge_elements: Vec<(Rect, LayoutElement)> = Vec::new();
        for edge in Edge::ALL {
            let slots = edge.slots();
            let available = self.area.available(edge);
            let mut inputs: [Option<SlotConstraints>; 3] = [None, None, None];
            let mut elements: [Option<LayoutElement>; 3] = [None, None, None];
            for (position, slot) in slots.into_iter().enumerate() {
                let Some(element) = self.box_content(slot, page_number, ctx)? else {
                    continue;
                };
                let declarations = self
                    .boxes
                    .iter()
                    .find(|b| b.slot == slot)
                    .map(|b| b.declarations.clone())
                    .unwrap_or_default();
                inputs[position] =
                    Some(self.slot_constraints(edge, &declarations, &element, engine));
                elements[position] = Some(element);
            }
            if inputs.iter().all(Option::is_none) {
                continue;
            }
            let solved = solve_edge(available, inputs);
            let rects = self.area.edge_rects(edge, solved);
            for position in 0..3 {
                let Some(element) = elements[position].take() else {
                    continue;
                };
                let rect = rects[position];
                // boxes solved down to nothing are dropped from rendering
                if rect.width.to_milli_i64() == 0 || rect.height.to_milli_i64() == 0 {
                    continue;
                }
                edge_elements.push((rect, element));
            }
        }

        for (rect, element) in corner_elements.into_iter().chain(edge_elements) {
            draw_margin_box(page.after_mut(handle), rect, &element, engine);
        }
        Ok(())
    }

    fn slot_constraints(
        &self,
        edge: Edge,
        declarations: &StyleMap,
        element: &LayoutElement,
        engine: &dyn LayoutEngine,
    ) -> SlotConstraints {
        let horizontal = edge.is_horizontal();
        let primary = if horizontal { "width" } else { "height" };
        let fixed = declarations.get(primary).and_then(parse_length);
        let mut constraints = match fixed {
            Some(value) => SlotConstraints::fixed(value),
            None => {
                // content-driven extents: one measurement at an effectively
                // unconstrained size
                let probe = Size::new(Pt::from_f32(1.0e7), Pt::from_f32(1.0e7));
                let measured = engine.measure(element, probe);
                let extent = if horizontal {
                    measured.width
                } else {
                    measured.height
                };
                SlotConstraints::auto(Pt::ZERO, extent)
            }
        };
        let min_name = if horizontal { "min-width" } else { "min-height" };
        let max_name = if horizontal { "max-width" } else { "max-height" };
        if let Some(min) = declarations.get(min_name).and_then(parse_length) {
            constraints = constraints.with_min(min);
        }
        if let Some(max) = declarations.get(max_name).and_then(parse_length) {
            constraints = constraints.with_max(max);
        }
        constraints
    }

    /// Build the content element for one margin box on one page, or `None`
    /// when the slot is unpopulated or resolves to nothing drawable. A
    /// custom worker registered for the box's `@`-name that finalizes into
    /// nothing is fatal.
    fn box_content(
        &self,
        slot: usize,
        page_number: usize,
        ctx: &mut ProcessorContext,
    ) -> Result<Option<LayoutElement>, FolioError> {
        let Some(entry) = self.boxes.iter().find(|b| b.slot == slot) else {
            return Ok(None);
        };
        let name = MARGIN_BOX_NAMES[slot];
        let pieces = entry
            .declarations
            .get("content")
            .map(parse_content)
            .unwrap_or_default();

        let worker_tag = format!("@{}", name);
        if ctx.tag_workers.has(&worker_tag) {
            let node = crate::dom::Node::new_element(worker_tag.clone());
            let worker = ctx.tag_workers.create(
                &worker_tag,
                entry.declarations.display(),
                &node,
                &entry.declarations,
            );
            if let Some(mut worker) = worker {
                let text = resolve_margin_content(&pieces, page_number, ctx);
                worker.process_content(&text);
                worker.process_end(&node, &entry.declarations);
                return match worker.take_element() {
                    Some(element) => Ok(Some(element)),
                    None => Err(FolioError::MarginBoxContent(name.to_string())),
                };
            }
        }

        let mut element = LayoutElement::new(ElementKind::Block, worker_tag);
        ctx.counters.set_current_page(page_number);
        for piece in &pieces {
            match piece {
                ContentPiece::Text(text) => {
                    element.push_child(LayoutElement::text_leaf(text.clone()));
                }
                ContentPiece::Counter { name, style } => {
                    let value = ctx.counters.value(name);
                    element.push_child(LayoutElement::text_leaf(format_counter(value, *style)));
                }
                ContentPiece::RunningRef { name, policy } => {
                    let policy = Occurrence::parse(policy);
                    if let Some(running) = ctx.running.lookup(name, policy, page_number) {
                        element.push_child(running.element.clone());
                    }
                }
                ContentPiece::TargetCounter { target, name, style } => {
                    let anchor = target.trim_start_matches('#');
                    if name == "page" {
                        if let Some(page) = ctx.links.get(anchor).copied().filter(|p| *p > 0) {
                            element
                                .push_child(LayoutElement::text_leaf(format_counter(page as i64, *style)));
                        }
                    }
                }
                ContentPiece::Attr(_) => {}
            }
        }
        if let Some(size) = entry.declarations.length("font-size") {
            element.font_size = size;
        }
        if element.children.is_empty() {
            if !pieces.is_empty() {
                self.diagnostics.report(
                    DiagnosticKind::MarginBoxContentUndrawable,
                    format!("{} on page {}", name, page_number),
                );
            }
            return Ok(None);
        }
        Ok(Some(element))
    }
}

fn mark_zone() -> Pt {
    Pt::from_f32(12.0)
}

fn resolve_margin_content(
    pieces: &[ContentPiece],
    page_number: usize,
    ctx: &mut ProcessorContext,
) -> String {
    ctx.counters.set_current_page(page_number);
    let mut out = String::new();
    for piece in pieces {
        match piece {
            ContentPiece::Text(text) => out.push_str(text),
            ContentPiece::Counter { name, style } => {
                out.push_str(&format_counter(ctx.counters.value(name), *style));
            }
            _ => {}
        }
    }
    out
}

fn draw_margin_box(
    canvas: &mut crate::canvas::Canvas,
    rect: Rect,
    element: &LayoutElement,
    engine: &dyn LayoutEngine,
) {
    canvas.draw_box(
        rect,
        element.background,
        element.border_widths.top,
        element.border_color,
    );
    let text = element.collected_text();
    if text.is_empty() {
        return;
    }
    let size = engine.measure(element, Size::new(rect.width, rect.height));
    let x = rect.x + (rect.width - size.width).max(Pt::ZERO) / 2;
    let y = rect.y + (rect.height - size.height).max(Pt::ZERO) / 2 + element.font_size;
    canvas.push(crate::canvas::Command::DrawString { x, y, text });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::debug::Diagnostics;
    use crate::element::BasicLayoutEngine;

    fn styles(props: &[(&str, &str)]) -> StyleMap {
        let mut map = StyleMap::new();
        for (name, value) in props {
            map.set(*name, *value);
        }
        map
    }

    fn rule_with_box(name: &str, declarations: StyleMap) -> PageRule {
        let mut rule = PageRule::default();
        rule.margin_boxes.insert(name.to_string(), declarations);
        rule
    }

    fn processor_for(rules: &[PageRule]) -> PageContextProcessor {
        let [first, _left, _right] = resolve_page_contexts(rules);
        PageContextProcessor::new(first, Diagnostics::new(), Size::a4(), Margins::all(56.69))
    }

    #[test]
    fn class_rules_override_base_declarations() {
        let mut base = PageRule::default();
        base.declarations = styles(&[("margin-top", "30pt"), ("size", "a4")]);
        let mut left = PageRule {
            selector: Some(PageSelector::Left),
            ..Default::default()
        };
        left.declarations = styles(&[("margin-top", "60pt")]);
        let [_, left_props, right_props] = resolve_page_contexts(&[base, left]);
        assert_eq!(left_props.styles.get("margin-top"), Some("60pt"));
        assert_eq!(right_props.styles.get("margin-top"), Some("30pt"));
        assert_eq!(left_props.styles.get("size"), Some("a4"));
    }

    #[test]
    fn margin_box_without_content_is_absent() {
        let with = rule_with_box("top-center", styles(&[("content", "\"x\"")]));
        let without = rule_with_box("top-left", styles(&[("width", "2cm")]));
        let none_content = rule_with_box("top-right", styles(&[("content", "none")]));
        let [first, _, _] = resolve_page_contexts(&[with, without, none_content]);
        assert!(first.margin_boxes[2].is_some());
        assert!(first.margin_boxes[1].is_none());
        assert!(first.margin_boxes[3].is_none());
    }

    #[test]
    fn page_one_is_right_unless_flipped_by_break_before_left() {
        let parity = PageParity::default();
        assert_eq!(parity.side_for(1), PageClass::Right);
        assert_eq!(parity.side_for(2), PageClass::Left);

        let mut first_root = LayoutElement::new(ElementKind::Block, "div");
        first_root.break_before = BreakRule::Left;
        let flipped = PageParity::from_flow(&[first_root]);
        assert_eq!(flipped.side_for(1), PageClass::Left);
        assert_eq!(flipped.side_for(2), PageClass::Right);
    }

    #[test]
    fn reset_resolves_size_margins_and_background() {
        let mut rule = PageRule::default();
        rule.declarations = styles(&[
            ("size", "letter landscape"),
            ("margin", "40pt"),
            ("margin-top", "70pt"),
            ("background-color", "#ffffff"),
            ("bleed", "6pt"),
            ("marks", "crop cross"),
        ]);
        let processor = processor_for(&[rule]);
        assert!(processor.page_size().is_landscape());
        assert_eq!(processor.page_size().width.to_f32(), 792.0);
        assert_eq!(processor.margins().top.to_f32(), 70.0);
        assert_eq!(processor.margins().left.to_f32(), 40.0);
        assert!(processor.background.is_some());
        assert_eq!(processor.bleed.to_f32(), 6.0);
        assert!(processor.marks_crop && processor.marks_cross);
    }

    #[test]
    fn new_page_applies_bleed_and_draws_marks_and_border() {
        let mut rule = PageRule::default();
        rule.declarations = styles(&[
            ("bleed", "8pt"),
            ("marks", "crop"),
            ("border-width", "1pt"),
        ]);
        let processor = processor_for(&[rule]);
        let mut page = Page::new(1, processor.page_size());
        processor.process_new_page(&mut page);
        assert_eq!(page.bleed_box, page.trim_box.expanded(Pt::from_f32(8.0)));
        assert!(page.media_box.width > page.bleed_box.width, "mark zone added");
        assert!(
            page.content
                .commands
                .iter()
                .any(|c| matches!(c, Command::Stroke)),
            "crop marks stroked"
        );
        assert!(
            page.content
                .commands
                .iter()
                .any(|c| matches!(c, Command::StrokeRect(_))),
            "page border drawn"
        );
    }

    #[test]
    fn background_goes_into_a_before_stream() {
        let mut rule = PageRule::default();
        rule.declarations = styles(&[("background-color", "#808080")]);
        let processor = processor_for(&[rule]);
        let mut page = Page::new(1, processor.page_size());
        let handle = processor.draw_page_background(&mut page);
        assert!(
            page.before[handle]
                .commands
                .iter()
                .any(|c| matches!(c, Command::FillRect(_)))
        );
        assert!(page.content.is_empty(), "normal content untouched");
    }

    #[test]
    fn single_top_center_box_spans_the_full_top_margin_width() {
        let rule = rule_with_box("top-center", styles(&[("content", "counter(page)")]));
        let processor = processor_for(&[rule]);
        let mut page = Page::new(3, processor.page_size());
        let mut ctx = ProcessorContext::new(Diagnostics::new());
        let engine = BasicLayoutEngine::default();
        processor
            .process_page_end(3, &mut page, &mut ctx, &engine)
            .expect("page end");
        let canvas = &page.after[0];
        let drawn: Vec<&String> = canvas
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawString { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(drawn, vec!["3"], "page counter resolved for page 3");
    }

    #[test]
    fn corner_box_in_a_collapsed_margin_is_dropped() {
        let mut rule = rule_with_box("top-left-corner", styles(&[("content", "\"c\"")]));
        rule.margin_boxes
            .insert("top-center".to_string(), styles(&[("content", "\"t\"")]));
        rule.declarations = styles(&[("margin-left", "0pt")]);
        let processor = processor_for(&[rule]);
        let mut page = Page::new(1, processor.page_size());
        let mut ctx = ProcessorContext::new(Diagnostics::new());
        let engine = BasicLayoutEngine::default();
        processor
            .process_page_end(1, &mut page, &mut ctx, &engine)
            .expect("page end");
        let drawn: Vec<&String> = page.after[0]
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawString { text, .. } => Some(text),
                _ => None,
            })
            .collect();
        assert_eq!(drawn, vec!["t"], "zero-width corner never rendered");
    }

    #[test]
    fn fixed_two_cm_pair_honors_declared_widths() {
        let left = rule_with_box(
            "top-left",
            styles(&[("content", "\"L\""), ("width", "2cm")]),
        );
        let right = rule_with_box(
            "top-right",
            styles(&[("content", "\"R\""), ("width", "2cm")]),
        );
        let [first, _, _] = resolve_page_contexts(&[left, right]);
        // 10cm strip: page width = 10cm + 2 margins
        let margin = Pt::from_f32(50.0);
        let strip = Pt::from_f32(10.0 * 72.0 / 2.54);
        let processor = PageContextProcessor::new(
            first,
            Diagnostics::new(),
            Size::new(strip + margin + margin, Pt::from_f32(700.0)),
            Margins {
                top: Pt::from_f32(60.0),
                right: margin,
                bottom: Pt::from_f32(60.0),
                left: margin,
            },
        );
        let mut page = Page::new(1, processor.page_size());
        let mut ctx = ProcessorContext::new(Diagnostics::new());
        let engine = BasicLayoutEngine::default();
        processor
            .process_page_end(1, &mut page, &mut ctx, &engine)
            .expect("page end");
        let strings: Vec<(f32, String)> = page.after[0]
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawString { x, text, .. } => Some((x.to_f32(), text.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(strings.len(), 2);
        // L is centered inside [50, 50+56.69]; R inside the last 2cm of the strip
        assert!(strings[0].0 < 110.0, "left box near strip start");
        assert!(strings[1].0 > 270.0, "right box near strip end");
    }

    #[test]
    fn unresolved_running_reference_is_undrawable_not_fatal() {
        let rule = rule_with_box("bottom-center", styles(&[("content", "element(header)")]));
        let diagnostics = Diagnostics::new();
        let [first, _, _] = resolve_page_contexts(&[rule]);
        let processor = PageContextProcessor::new(
            first,
            diagnostics.clone(),
            Size::a4(),
            Margins::all(50.0),
        );
        let mut page = Page::new(1, processor.page_size());
        let mut ctx = ProcessorContext::new(diagnostics.clone());
        let engine = BasicLayoutEngine::default();
        processor
            .process_page_end(1, &mut page, &mut ctx, &engine)
            .expect("recoverable");
        assert_eq!(
            diagnostics.count(DiagnosticKind::MarginBoxContentUndrawable),
            1
        );
    }

    #[test]
    fn custom_margin_box_worker_finalizing_to_nothing_is_fatal() {
        struct EmptyWorker;
        impl crate::worker::TagWorker for EmptyWorker {
            fn process_content(&mut self, _text: &str) -> bool {
                true
            }
            fn process_child(&mut self, _child: LayoutElement) -> bool {
                false
            }
            fn process_end(&mut self, _node: &crate::dom::Node, _styles: &StyleMap) {}
            fn take_element(&mut self) -> Option<LayoutElement> {
                None
            }
        }
        let rule = rule_with_box("top-center", styles(&[("content", "\"x\"")]));
        let processor = processor_for(&[rule]);
        let mut ctx = ProcessorContext::new(Diagnostics::new());
        ctx.tag_workers
            .register("@top-center", None, Box::new(|_, _| Box::new(EmptyWorker)));
        let mut page = Page::new(1, processor.page_size());
        let engine = BasicLayoutEngine::default();
        let result = processor.process_page_end(1, &mut page, &mut ctx, &engine);
        assert!(matches!(result, Err(FolioError::MarginBoxContent(_))));
    }

    #[test]
    fn running_element_lands_in_its_margin_box() {
        let rule = rule_with_box(
            "top-left",
            styles(&[("content", "element(chapter, first)")]),
        );
        let processor = processor_for(&[rule]);
        let mut ctx = ProcessorContext::new(Diagnostics::new());
        let mut heading = LayoutElement::new(ElementKind::Block, "h1");
        heading.push_child(LayoutElement::text_leaf("Chapter One"));
        let ordinal = ctx.running.register("chapter", heading);
        ctx.running.assign_page("chapter", ordinal, 2, true);
        let mut page = Page::new(2, processor.page_size());
        let engine = BasicLayoutEngine::default();
        processor
            .process_page_end(2, &mut page, &mut ctx, &engine)
            .expect("page end");
        let texts: Vec<String> = page.after[0]
            .commands
            .iter()
            .filter_map(|c| match c {
                Command::DrawString { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(texts, vec!["Chapter One".to_string()]);
    }
}
