mod applier;
mod canvas;
mod counters;
mod debug;
mod dom;
mod element;
mod error;
mod margin_boxes;
mod page;
mod running;
mod style;
mod types;
mod walker;
mod worker;

pub use applier::{StyleApplier, StyleApplierRegistry, apply_common, default_appliers};
pub use canvas::{Canvas, Command, Page};
pub use counters::{CounterManager, format_counter};
pub use debug::{Diagnostic, DiagnosticKind, Diagnostics};
pub use dom::{Node, parse_document};
pub use element::{
    BasicLayoutEngine, BreakRule, EdgeSizes, ElementKind, LayoutElement, LayoutEngine,
};
pub use error::FolioError;
pub use margin_boxes::{
    Edge, MARGIN_BOX_NAMES, MarginArea, SlotConstraints, slot_index, solve_edge,
};
pub use page::{
    PageClass, PageContextProcessor, PageContextProperties, PageParity, PageRule, PageSelector,
    resolve_page_contexts,
};
pub use running::{Occurrence, RunningElement, RunningElementManager};
pub use style::{
    ContentPiece, CounterStyle, Display, InlineStyleResolver, Position, StyleMap, StyleResolver,
    parse_content, parse_length, parse_page_size,
};
pub use types::{Color, Margins, Pt, Rect, Size};
pub use walker::{
    DEFAULT_MAX_RELAYOUT_PASSES, DocumentWalker, OutlineEntry, ProcessorContext, WalkMode,
};
pub use worker::{
    ContainerWorker, TagWorker, TagWorkerRegistry, WorkerFactory, default_registry,
};

/// Converts HTML plus resolved `@page` rules into decorated pages. Holds the
/// per-instance defaults; all per-conversion state lives in a fresh
/// `ProcessorContext` inside `convert`.
pub struct Folio {
    default_page_size: Size,
    default_margins: Margins,
    max_relayout_passes: usize,
    diagnostics: Diagnostics,
    engine: Box<dyn LayoutEngine>,
    context_setup: Option<Box<dyn Fn(&mut ProcessorContext)>>,
}

pub struct FolioBuilder {
    page_size: Size,
    margins: Margins,
    max_relayout_passes: usize,
    diagnostics_path: Option<std::path::PathBuf>,
    engine: Option<Box<dyn LayoutEngine>>,
    context_setup: Option<Box<dyn Fn(&mut ProcessorContext)>>,
}

impl FolioBuilder {
    pub fn new() -> Self {
        Self {
            page_size: Size::a4(),
            margins: Margins::all(56.69),
            max_relayout_passes: DEFAULT_MAX_RELAYOUT_PASSES,
            diagnostics_path: None,
            engine: None,
            context_setup: None,
        }
    }

    pub fn page_size(mut self, size: Size) -> Self {
        self.page_size = size;
        self
    }

    pub fn margins(mut self, margins: Margins) -> Self {
        self.margins = margins;
        self
    }

    pub fn max_relayout_passes(mut self, passes: usize) -> Self {
        self.max_relayout_passes = passes;
        self
    }

    /// Write diagnostics as JSON lines to the given path in addition to the
    /// in-memory counters.
    pub fn diagnostics_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.diagnostics_path = Some(path.into());
        self
    }

    pub fn layout_engine(mut self, engine: Box<dyn LayoutEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Runs against the fresh `ProcessorContext` of every conversion, before
    /// the walk starts. The place to register custom tag workers, style
    /// appliers, or margin-box content workers.
    pub fn context_setup(mut self, setup: impl Fn(&mut ProcessorContext) + 'static) -> Self {
        self.context_setup = Some(Box::new(setup));
        self
    }

    pub fn build(self) -> Result<Folio, FolioError> {
        if self.max_relayout_passes == 0 {
            return Err(FolioError::InvalidConfiguration(
                "max_relayout_passes must be at least 1".to_string(),
            ));
        }
        let diagnostics = match self.diagnostics_path {
            Some(path) => Diagnostics::with_sink(path)?,
            None => Diagnostics::new(),
        };
        Ok(Folio {
            default_page_size: self.page_size,
            default_margins: self.margins,
            max_relayout_passes: self.max_relayout_passes,
            diagnostics,
            engine: self
                .engine
                .unwrap_or_else(|| Box::new(BasicLayoutEngine::default())),
            context_setup: self.context_setup,
        })
    }
}

impl Default for FolioBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything one conversion produced: the decorated pages, the element
/// forest behind them, the document outline, and the diagnostics handle.
pub struct Conversion {
    pub pages: Vec<Page>,
    pub roots: Vec<LayoutElement>,
    pub outline: Vec<OutlineEntry>,
    pub diagnostics: Diagnostics,
    pub passes: usize,
}

impl Folio {
    pub fn builder() -> FolioBuilder {
        FolioBuilder::new()
    }

    pub fn convert(&self, html: &str, rules: &[PageRule]) -> Result<Conversion, FolioError> {
        self.convert_with_resolver(html, rules, &InlineStyleResolver)
    }

    pub fn convert_with_resolver(
        &self,
        html: &str,
        rules: &[PageRule],
        resolver: &dyn StyleResolver,
    ) -> Result<Conversion, FolioError> {
        let document = parse_document(html);
        let mut ctx = ProcessorContext::new(self.diagnostics.clone());
        ctx.max_relayout_passes = self.max_relayout_passes;
        if let Some(setup) = &self.context_setup {
            setup(&mut ctx);
        }

        let [first, left, right] = resolve_page_contexts(rules);
        let processors = [first, left, right].map(|props| {
            PageContextProcessor::new(
                props,
                self.diagnostics.clone(),
                self.default_page_size,
                self.default_margins,
            )
        });
        // pagination runs against the regular (right-class) page geometry
        let content_size = processors[2].content_size();

        // Late-bound counters force a counters-only pre-pass so the first
        // real pass already knows relayout will be needed.
        let mut needs_totals = false;
        if references_late_bound(html, rules) {
            DocumentWalker::new(&mut ctx, resolver, WalkMode::CountersOnly).walk(&document)?;
            needs_totals = true;
            ctx.reset_for_pass();
        }

        let mut passes = 0;
        let mut roots;
        let mut flow;
        let mut page_layout;
        loop {
            passes += 1;
            if passes > 1 {
                ctx.reset_for_pass();
            }
            roots = DocumentWalker::new(&mut ctx, resolver, WalkMode::Main).walk(&document)?;
            flow = flow_roots(&roots);
            page_layout = self.engine.paginate(&flow, content_size);
            assign_pages(&mut ctx, &flow, &page_layout);

            let total = page_layout.len();
            let totals_stale = (ctx.counters.pages_referenced() || needs_totals)
                && ctx.counters.total_pages() != total;
            let unresolved = ctx.had_unresolved_targets();
            ctx.counters.set_total_pages(total);
            if !totals_stale && !unresolved {
                break;
            }
            if passes >= ctx.max_relayout_passes {
                self.diagnostics.report(
                    DiagnosticKind::RelayoutLimitExceeded,
                    format!("gave up after {} passes", passes),
                );
                break;
            }
        }

        let parity = PageParity::from_flow(&flow);
        let body_background = body_background(&roots);
        let mut pages = Vec::with_capacity(page_layout.len());
        for (page_index, indices) in page_layout.iter().enumerate() {
            let number = page_index + 1;
            let processor = if number == 1 {
                &processors[0]
            } else {
                match parity.side_for(number) {
                    PageClass::Left => &processors[1],
                    _ => &processors[2],
                }
            };
            let mut page = Page::new(number, processor.page_size());
            processor.process_new_page(&mut page);
            let handle = processor.draw_page_background(&mut page);
            if let Some(color) = body_background {
                let trim = page.trim_box;
                page.before_mut(handle).draw_box(trim, Some(color), Pt::ZERO, None);
            }
            self.draw_page_content(&mut page, processor, &flow, indices);
            processor.process_page_end(number, &mut page, &mut ctx, self.engine.as_ref())?;
            pages.push(page);
        }
        self.diagnostics.flush();

        Ok(Conversion {
            pages,
            roots,
            outline: std::mem::take(&mut ctx.outline),
            diagnostics: self.diagnostics.clone(),
            passes,
        })
    }

    /// Record the flow content of one page. This is a stand-in for a full box
    /// renderer: each root gets its background box and collected text.
    fn draw_page_content(
        &self,
        page: &mut Page,
        processor: &PageContextProcessor,
        flow: &[LayoutElement],
        indices: &[usize],
    ) {
        let margins = processor.margins();
        let content = processor.content_size();
        let mut y = margins.top;
        for &index in indices {
            let Some(root) = flow.get(index) else {
                continue;
            };
            if root.kind == ElementKind::RunningPlaceholder {
                continue;
            }
            let size = self.engine.measure(root, content);
            let rect = Rect::new(margins.left, y, size.width, size.height);
            page.content
                .draw_box(rect, root.background, root.border_widths.top, root.border_color);
            let text = root.collected_text();
            if !text.is_empty() {
                page.content.push(Command::DrawString {
                    x: rect.x,
                    y: y + root.font_size,
                    text,
                });
            }
            y += size.height;
        }
    }
}

/// The walker hands back the `html` root; pagination distributes what flows,
/// which is the body's children.
fn flow_roots(roots: &[LayoutElement]) -> Vec<LayoutElement> {
    if let [html] = roots {
        if html.tag == "html" {
            if let Some(body) = html.children.iter().find(|c| c.tag == "body") {
                return body.children.clone();
            }
        }
    }
    roots.to_vec()
}

fn body_background(roots: &[LayoutElement]) -> Option<Color> {
    let html = roots.iter().find(|r| r.tag == "html")?;
    html.background.or_else(|| {
        html.children
            .iter()
            .find(|c| c.tag == "body")
            .and_then(|body| body.background)
    })
}

fn references_late_bound(html: &str, rules: &[PageRule]) -> bool {
    let hit = |text: &str| text.contains("counter(pages") || text.contains("target-counter(");
    if hit(html) {
        return true;
    }
    rules.iter().any(|rule| {
        rule.margin_boxes
            .values()
            .any(|declarations| declarations.get("content").map(hit).unwrap_or(false))
    })
}

/// After pagination, tell the context which page every anchor and running
/// element landed on. The first element encountered on a page carries the
/// first-on-page flag for `first-except` resolution.
fn assign_pages(ctx: &mut ProcessorContext, flow: &[LayoutElement], layout: &[Vec<usize>]) {
    for (page_index, indices) in layout.iter().enumerate() {
        let page = page_index + 1;
        let mut first = true;
        for &index in indices {
            if let Some(root) = flow.get(index) {
                record_page(ctx, root, page, &mut first);
            }
        }
    }
}

fn record_page(ctx: &mut ProcessorContext, element: &LayoutElement, page: usize, first: &mut bool) {
    if let Some(name) = &element.destination {
        ctx.links.insert(name.clone(), page);
    }
    if let Some((name, ordinal)) = &element.running_ref {
        ctx.running.assign_page(name, *ordinal, page, *first);
    }
    *first = false;
    for child in &element.children {
        record_page(ctx, child, page, first);
    }
}
