use crate::applier::{StyleApplierRegistry, default_appliers};
use crate::counters::{CounterManager, format_counter};
use crate::debug::{DiagnosticKind, Diagnostics};
use crate::dom::{self, Node};
use crate::element::{ElementKind, LayoutElement};
use crate::error::FolioError;
use crate::running::RunningElementManager;
use crate::style::{ContentPiece, Display, Position, StyleMap, StyleResolver, parse_content};
use crate::worker::{TagWorkerRegistry, default_registry};
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct OutlineEntry {
    pub priority: u8,
    pub title: String,
    pub destination: Option<String>,
}

pub const DEFAULT_MAX_RELAYOUT_PASSES: usize = 10;

/// Per-conversion mutable state threaded explicitly through the walk. One
/// instance per conversion; never shared between conversions.
pub struct ProcessorContext {
    pub tag_workers: TagWorkerRegistry,
    pub appliers: StyleApplierRegistry,
    pub counters: CounterManager,
    pub running: RunningElementManager,
    /// Anchor name -> page number, filled in by pagination. A name seen in a
    /// target-counter() before it has a page forces another layout pass.
    pub links: HashMap<String, usize>,
    pub outline: Vec<OutlineEntry>,
    outline_priorities: HashMap<String, u8>,
    pub diagnostics: Diagnostics,
    pub max_relayout_passes: usize,
    unresolved_targets: bool,
    // open-worker stack; pushes and pops stay paired within one visit call
    workers: Vec<Box<dyn crate::worker::TagWorker>>,
}

impl ProcessorContext {
    pub fn new(diagnostics: Diagnostics) -> Self {
        let mut outline_priorities = HashMap::new();
        for (tag, priority) in [("h1", 1u8), ("h2", 2), ("h3", 3), ("h4", 4), ("h5", 5), ("h6", 6)]
        {
            outline_priorities.insert(tag.to_string(), priority);
        }
        Self {
            tag_workers: default_registry(),
            appliers: default_appliers(),
            counters: CounterManager::new(),
            running: RunningElementManager::new(),
            links: HashMap::new(),
            outline: Vec::new(),
            outline_priorities,
            diagnostics,
            max_relayout_passes: DEFAULT_MAX_RELAYOUT_PASSES,
            unresolved_targets: false,
            workers: Vec::new(),
        }
    }

    pub fn had_unresolved_targets(&self) -> bool {
        self.unresolved_targets
    }

    /// Prepare for the next walk pass over the same document. Link page
    /// assignments survive so target-counters resolve against the previous
    /// layout; running elements are re-registered by the walk itself.
    pub fn reset_for_pass(&mut self) {
        self.counters.reset_for_pass();
        self.running.clear();
        self.outline.clear();
        self.unresolved_targets = false;
        self.workers.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkMode {
    /// Full attachment: workers, appliers, output forest.
    Main,
    /// Counter pre-pass: resolves counters/content only, creates nothing.
    CountersOnly,
}

/// Recursive visitor turning a resolved node tree into a forest of layout
/// elements. Each node is visited exactly once per pass; pseudo-elements are
/// synthesized in the fixed order before / placeholder / children / after.
pub struct DocumentWalker<'a> {
    ctx: &'a mut ProcessorContext,
    resolver: &'a dyn StyleResolver,
    mode: WalkMode,
}

impl<'a> DocumentWalker<'a> {
    pub fn new(
        ctx: &'a mut ProcessorContext,
        resolver: &'a dyn StyleResolver,
        mode: WalkMode,
    ) -> Self {
        Self {
            ctx,
            resolver,
            mode,
        }
    }

    pub fn walk(&mut self, root: &Node) -> Result<Vec<LayoutElement>, FolioError> {
        let mut roots = Vec::new();
        self.visit(root, &mut roots)?;
        Ok(roots)
    }

    fn visit(&mut self, node: &Node, roots: &mut Vec<LayoutElement>) -> Result<(), FolioError> {
        if node.is_element() {
            self.visit_element(node, roots)
        } else {
            self.visit_text(node);
            Ok(())
        }
    }

    fn visit_text(&mut self, node: &Node) {
        let Some(text) = node.text() else {
            return;
        };
        if self.mode == WalkMode::CountersOnly {
            return;
        }
        let consumed = match self.ctx.workers.last_mut() {
            Some(worker) => worker.process_content(&text),
            None => false,
        };
        if !consumed {
            self.ctx.diagnostics.report(
                DiagnosticKind::NoConsumerForText,
                text.chars().take(40).collect::<String>(),
            );
        }
    }

    fn visit_element(
        &mut self,
        node: &Node,
        roots: &mut Vec<LayoutElement>,
    ) -> Result<(), FolioError> {
        let tag = node.tag().unwrap_or_default();

        // Synthesized nodes arrive with their style pre-resolved; everything
        // else goes through the external resolver.
        let styles = match node.resolved_style() {
            Some(existing) => existing,
            None => self.resolver.resolve(node),
        };
        let display = styles.display();
        if display == Display::None && tag != dom::TAG_PLACEHOLDER {
            return Ok(());
        }
        node.set_resolved_style(styles.clone());

        let mut worker = None;
        if self.mode == WalkMode::Main {
            worker = self.ctx.tag_workers.create(&tag, display, node, &styles);
            if worker.is_none() {
                self.ctx
                    .diagnostics
                    .report(DiagnosticKind::NoWorkerForTag, tag.clone());
            }
        }
        let has_worker = worker.is_some();
        if let Some(worker) = worker {
            self.ctx.workers.push(worker);
        }

        // Outline entry is opened before descending; the title is filled in
        // from the finished element after.
        let priority = self.ctx.outline_priorities.get(&tag).copied();
        let outline_index = priority.map(|priority| {
            self.ctx.outline.push(OutlineEntry {
                priority,
                title: String::new(),
                destination: node.attr("id"),
            });
            self.ctx.outline.len() - 1
        });

        self.ctx.counters.process_counters(&styles);

        // Relayout passes re-synthesize pseudo nodes; snapshot the parsed
        // children before any synthesis mutates the child list.
        node.remove_synthetic_children();
        let children = node.children();
        if can_have_generated_content(&tag) {
            self.synthesize_pseudo(node, dom::TAG_BEFORE, roots)?;
        }
        if exposes_placeholder_slot(&tag) {
            self.synthesize_placeholder(node, roots)?;
        }
        for child in children {
            self.visit(&child, roots)?;
        }
        if can_have_generated_content(&tag) {
            self.synthesize_pseudo(node, dom::TAG_AFTER, roots)?;
        }

        self.ctx.counters.end_scope();

        let finished = if has_worker {
            self.ctx.workers.pop()
        } else {
            None
        };
        if let Some(mut worker) = finished {
            worker.process_end(node, &styles);
            if let Some(mut element) = worker.take_element() {
                if !self.ctx.appliers.apply(&tag, &styles, &mut element) {
                    self.ctx
                        .diagnostics
                        .report(DiagnosticKind::NoApplierForTag, tag.clone());
                }
                if let Some(name) = element.destination.clone() {
                    self.ctx.links.entry(name).or_default();
                }
                if let Some(index) = outline_index {
                    self.ctx.outline[index].title = element.collected_text();
                }
                let element = self.extract_running(&styles, element)?;
                match self.ctx.workers.last_mut() {
                    Some(parent) => {
                        if !parent.process_child(element) {
                            self.ctx
                                .diagnostics
                                .report(DiagnosticKind::WorkerRejectedChild, tag.clone());
                        }
                    }
                    None => roots.push(element),
                }
            }
        } else if let Some(index) = outline_index {
            // no worker, but the heading is still part of the outline
            self.ctx.outline[index].title = tag.clone();
        }

        node.clear_resolved_style();
        Ok(())
    }

    /// `position: running(name)` pulls the finished element out of normal
    /// flow; a lightweight placeholder keeps the surrounding layout intact.
    fn extract_running(
        &mut self,
        styles: &StyleMap,
        element: LayoutElement,
    ) -> Result<LayoutElement, FolioError> {
        match styles.position()? {
            Position::Running(name) => {
                let tag = element.tag.clone();
                let ordinal = self.ctx.running.register(&name, element);
                let mut placeholder = LayoutElement::new(ElementKind::RunningPlaceholder, tag);
                placeholder.running_ref = Some((name, ordinal));
                Ok(placeholder)
            }
            _ => Ok(element),
        }
    }

    fn synthesize_pseudo(
        &mut self,
        node: &Node,
        pseudo_tag: &str,
        roots: &mut Vec<LayoutElement>,
    ) -> Result<(), FolioError> {
        let which = if pseudo_tag == dom::TAG_BEFORE {
            "before"
        } else {
            "after"
        };
        let Some(styles) = self.resolver.resolve_pseudo(node, which) else {
            return Ok(());
        };
        let Some(content) = styles.get("content") else {
            return Ok(());
        };
        let text = self.resolve_content(&parse_content(content), node);

        let synthesized = Node::new_element(pseudo_tag);
        if !text.is_empty() {
            synthesized.append_child(Node::new_text(text));
        }
        node.append_child(synthesized.clone());
        if pseudo_invisible(&synthesized, &styles) {
            return Ok(());
        }
        synthesized.set_resolved_style(styles);
        self.visit(&synthesized, roots)
    }

    fn synthesize_placeholder(
        &mut self,
        node: &Node,
        roots: &mut Vec<LayoutElement>,
    ) -> Result<(), FolioError> {
        let Some(hint) = node.attr("placeholder") else {
            return Ok(());
        };
        let synthesized = Node::new_element(dom::TAG_PLACEHOLDER);
        synthesized.append_child(Node::new_text(hint));
        node.append_child(synthesized.clone());
        let mut styles = self
            .resolver
            .resolve_pseudo(node, "placeholder")
            .unwrap_or_default();
        if styles.get("display").is_none() {
            styles.set("display", "inline");
        }
        synthesized.set_resolved_style(styles);
        self.visit(&synthesized, roots)
    }

    /// Flatten content pieces into text, reading counters at their current
    /// document-order values. `element()` references are meaningless outside
    /// margin boxes and resolve to nothing here.
    fn resolve_content(&mut self, pieces: &[ContentPiece], node: &Node) -> String {
        let mut out = String::new();
        for piece in pieces {
            match piece {
                ContentPiece::Text(text) => out.push_str(text),
                ContentPiece::Counter { name, style } => {
                    let value = self.ctx.counters.value(name);
                    out.push_str(&format_counter(value, *style));
                }
                ContentPiece::Attr(name) => {
                    if let Some(value) = node.attr(name) {
                        out.push_str(&value);
                    }
                }
                ContentPiece::TargetCounter {
                    target,
                    name,
                    style,
                } => {
                    let anchor = resolve_target(target, node);
                    match anchor.and_then(|a| self.ctx.links.get(&a).copied()) {
                        Some(page) if page > 0 && name == "page" => {
                            out.push_str(&format_counter(page as i64, *style));
                        }
                        _ => {
                            self.ctx.unresolved_targets = true;
                            out.push('1');
                        }
                    }
                }
                ContentPiece::RunningRef { .. } => {}
            }
        }
        out
    }
}

fn resolve_target(target: &str, node: &Node) -> Option<String> {
    let raw = if let Some(args) = target.strip_prefix("attr(") {
        let attr = args.strip_suffix(')')?.trim();
        node.attr(attr)?
    } else {
        target.trim_matches(|c| c == '"' || c == '\'').to_string()
    };
    Some(raw.trim_start_matches('#').to_string())
}

fn can_have_generated_content(tag: &str) -> bool {
    !matches!(tag, "br" | "input" | "textarea" | "img" | "hr")
        && !tag.starts_with("::")
        && !tag.starts_with("-folio-")
}

fn exposes_placeholder_slot(tag: &str) -> bool {
    matches!(tag, "input" | "textarea")
}

/// Generated content default-displays inline, so an empty synthesized node
/// must not force a box: it is visible only if it has children, or is
/// positioned out of flow, or was given a non-inline display.
fn pseudo_invisible(node: &Node, styles: &StyleMap) -> bool {
    if node.has_children() {
        return false;
    }
    let positioned = matches!(
        styles.get("position"),
        Some("absolute") | Some("fixed")
    );
    if positioned {
        return false;
    }
    matches!(styles.display(), Display::Inline | Display::Unset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_document;
    use crate::style::InlineStyleResolver;

    fn walk_html(html: &str) -> (Vec<LayoutElement>, ProcessorContext) {
        let root = parse_document(html);
        let mut ctx = ProcessorContext::new(Diagnostics::new());
        let resolver = InlineStyleResolver;
        let roots = DocumentWalker::new(&mut ctx, &resolver, WalkMode::Main)
            .walk(&root)
            .expect("walk");
        (roots, ctx)
    }

    #[test]
    fn every_element_with_a_factory_gets_exactly_one_worker() {
        let (roots, ctx) = walk_html(
            "<html><body><div><p>one</p><p>two <span>x</span></p></div></body></html>",
        );
        assert_eq!(roots.len(), 1, "html is the single root");
        // html + body + div + 2 p + span = 6 elements, all with factories
        assert_eq!(ctx.diagnostics.count(DiagnosticKind::NoWorkerForTag), 0);
        let html = &roots[0];
        assert_eq!(html.tag, "html");
        let body = &html.children[0];
        let div = &body.children[0];
        assert_eq!(div.children.len(), 2);
        assert_eq!(div.children[1].collected_text(), "two x");
    }

    #[test]
    fn display_none_skips_the_whole_subtree() {
        let (roots, ctx) = walk_html(
            r#"<html><body><div style="display:none"><p style="position:fixed">hidden</p></div><p>shown</p></body></html>"#,
        );
        let body = &roots[0].children[0];
        assert_eq!(body.children.len(), 1);
        assert_eq!(body.children[0].collected_text(), "shown");
        assert_eq!(ctx.diagnostics.count(DiagnosticKind::NoWorkerForTag), 0);
    }

    #[test]
    fn unknown_tag_is_logged_and_children_attach_to_ancestor() {
        let (roots, ctx) = walk_html("<html><body><widget><p>inside</p></widget></body></html>");
        assert_eq!(ctx.diagnostics.count(DiagnosticKind::NoWorkerForTag), 1);
        let body = &roots[0].children[0];
        // the p attached to body because widget had no worker
        assert_eq!(body.children.len(), 1);
        assert_eq!(body.children[0].tag, "p");
    }

    #[test]
    fn text_with_no_open_worker_is_dropped_non_fatally() {
        let root = Node::new_text("orphan");
        let mut ctx = ProcessorContext::new(Diagnostics::new());
        let resolver = InlineStyleResolver;
        let roots = DocumentWalker::new(&mut ctx, &resolver, WalkMode::Main)
            .walk(&root)
            .expect("walk");
        assert!(roots.is_empty());
        assert_eq!(ctx.diagnostics.count(DiagnosticKind::NoConsumerForText), 1);
    }

    struct PseudoResolver;

    impl StyleResolver for PseudoResolver {
        fn resolve(&self, node: &Node) -> StyleMap {
            InlineStyleResolver.resolve(node)
        }

        fn resolve_pseudo(&self, node: &Node, pseudo: &str) -> Option<StyleMap> {
            if node.tag().as_deref() == Some("p") && pseudo != "placeholder" {
                let mut styles = StyleMap::new();
                let text = if pseudo == "before" { "\"<\"" } else { "\">\"" };
                styles.set("content", text);
                styles.set("display", "inline");
                Some(styles)
            } else {
                None
            }
        }
    }

    #[test]
    fn before_content_is_first_and_after_content_is_last() {
        let root = parse_document("<html><body><p>mid</p></body></html>");
        let mut ctx = ProcessorContext::new(Diagnostics::new());
        let resolver = PseudoResolver;
        let roots = DocumentWalker::new(&mut ctx, &resolver, WalkMode::Main)
            .walk(&root)
            .expect("walk");
        let p = &roots[0].children[0].children[0];
        assert_eq!(p.collected_text(), "<mid>");
        assert_eq!(p.children.first().unwrap().tag, dom::TAG_BEFORE);
        assert_eq!(p.children.last().unwrap().tag, dom::TAG_AFTER);
    }

    struct EmptyPseudoResolver;

    impl StyleResolver for EmptyPseudoResolver {
        fn resolve(&self, node: &Node) -> StyleMap {
            InlineStyleResolver.resolve(node)
        }

        fn resolve_pseudo(&self, node: &Node, pseudo: &str) -> Option<StyleMap> {
            if node.tag().as_deref() == Some("p") && pseudo == "before" {
                let mut styles = StyleMap::new();
                styles.set("content", "\"\"");
                Some(styles)
            } else {
                None
            }
        }
    }

    #[test]
    fn empty_inline_pseudo_element_is_never_visited() {
        let root = parse_document("<html><body><p>text</p></body></html>");
        let mut ctx = ProcessorContext::new(Diagnostics::new());
        let resolver = EmptyPseudoResolver;
        let roots = DocumentWalker::new(&mut ctx, &resolver, WalkMode::Main)
            .walk(&root)
            .expect("walk");
        let p = &roots[0].children[0].children[0];
        assert!(
            p.children.iter().all(|c| c.tag != dom::TAG_BEFORE),
            "empty inline before-content must not produce a box"
        );
    }

    #[test]
    fn placeholder_is_synthesized_into_the_form_field_slot() {
        let (roots, _ctx) = walk_html(
            r#"<html><body><input placeholder="Your name"></body></html>"#,
        );
        let body = &roots[0].children[0];
        let input = &body.children[0];
        assert_eq!(
            input.placeholder.as_ref().map(|p| p.collected_text()),
            Some("Your name".to_string())
        );
    }

    #[test]
    fn running_element_is_extracted_and_replaced_by_placeholder() {
        let (roots, ctx) = walk_html(
            r#"<html><body><h1 style="position:running(chapter)">Intro</h1><p>body</p></body></html>"#,
        );
        let body = &roots[0].children[0];
        assert_eq!(body.children.len(), 2);
        assert_eq!(body.children[0].kind, ElementKind::RunningPlaceholder);
        assert_eq!(
            body.children[0].running_ref,
            Some(("chapter".to_string(), 0))
        );
        assert!(body.children[0].collected_text().is_empty());
        let stored = ctx
            .running
            .lookup("chapter", crate::running::Occurrence::First, 1);
        assert!(stored.is_none(), "page not assigned until layout");
        assert!(!ctx.running.is_empty());
    }

    #[test]
    fn corrupt_running_name_is_fatal() {
        let root = parse_document(
            r#"<html><body><h1 style="position:running()">x</h1></body></html>"#,
        );
        let mut ctx = ProcessorContext::new(Diagnostics::new());
        let resolver = InlineStyleResolver;
        let result = DocumentWalker::new(&mut ctx, &resolver, WalkMode::Main).walk(&root);
        assert!(matches!(result, Err(FolioError::InvalidRunningName(_))));
    }

    #[test]
    fn counters_pre_pass_creates_no_elements() {
        let root = parse_document("<html><body><p>x</p></body></html>");
        let mut ctx = ProcessorContext::new(Diagnostics::new());
        let resolver = InlineStyleResolver;
        let roots = DocumentWalker::new(&mut ctx, &resolver, WalkMode::CountersOnly)
            .walk(&root)
            .expect("walk");
        assert!(roots.is_empty());
        assert_eq!(ctx.diagnostics.count(DiagnosticKind::NoWorkerForTag), 0);
    }

    #[test]
    fn outline_collects_headings_in_order_with_titles() {
        let (_roots, ctx) = walk_html(
            r#"<html><body><h1 id="a">One</h1><h2>One.One</h2><h1>Two</h1></body></html>"#,
        );
        let titles: Vec<(u8, String)> = ctx
            .outline
            .iter()
            .map(|e| (e.priority, e.title.clone()))
            .collect();
        assert_eq!(
            titles,
            vec![
                (1, "One".to_string()),
                (2, "One.One".to_string()),
                (1, "Two".to_string())
            ]
        );
        assert_eq!(ctx.outline[0].destination.as_deref(), Some("a"));
        assert!(ctx.links.contains_key("a"));
    }

    #[test]
    fn resolved_style_is_cleared_after_the_visit() {
        let root = parse_document("<html><body><div>x</div></body></html>");
        let mut ctx = ProcessorContext::new(Diagnostics::new());
        let resolver = InlineStyleResolver;
        DocumentWalker::new(&mut ctx, &resolver, WalkMode::Main)
            .walk(&root)
            .expect("walk");
        fn assert_cleared(node: &Node) {
            if node.is_element() {
                assert!(node.resolved_style().is_none());
            }
            for child in node.children() {
                assert_cleared(&child);
            }
        }
        assert_cleared(&root);
    }
}
