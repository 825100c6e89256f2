use crate::dom::{self, Node};
use crate::element::{ElementKind, LayoutElement};
use crate::style::{Display, StyleMap};
use std::collections::HashMap;

/// Per-element state machine. Created after style resolution, fed text and
/// finished children while the walker descends, finalized by `process_end`,
/// then consumed exactly once through `take_element`.
pub trait TagWorker {
    /// Accept a run of text. `false` means the worker cannot hold content.
    fn process_content(&mut self, text: &str) -> bool;

    /// Accept a finished child element. `false` means the child was refused.
    fn process_child(&mut self, child: LayoutElement) -> bool;

    fn process_end(&mut self, node: &Node, styles: &StyleMap);

    fn take_element(&mut self) -> Option<LayoutElement>;
}

/// Container worker for the block and inline families; the produced kind is
/// the only difference between the two.
pub struct ContainerWorker {
    element: Option<LayoutElement>,
}

impl ContainerWorker {
    pub fn block(node: &Node) -> Self {
        Self::with_kind(node, ElementKind::Block)
    }

    pub fn inline(node: &Node) -> Self {
        Self::with_kind(node, ElementKind::Inline)
    }

    fn with_kind(node: &Node, kind: ElementKind) -> Self {
        let tag = node.tag().unwrap_or_else(|| "div".to_string());
        Self {
            element: Some(LayoutElement::new(kind, tag)),
        }
    }
}

impl TagWorker for ContainerWorker {
    fn process_content(&mut self, text: &str) -> bool {
        if let Some(element) = self.element.as_mut() {
            element.push_child(LayoutElement::text_leaf(text));
            true
        } else {
            false
        }
    }

    fn process_child(&mut self, child: LayoutElement) -> bool {
        if let Some(element) = self.element.as_mut() {
            element.push_child(child);
            true
        } else {
            false
        }
    }

    fn process_end(&mut self, node: &Node, _styles: &StyleMap) {
        if let Some(element) = self.element.as_mut() {
            if let Some(id) = node.attr("id") {
                element.destination = Some(id);
            }
            if element.tag == "a" {
                element.link_target = node.attr("href");
            }
        }
    }

    fn take_element(&mut self) -> Option<LayoutElement> {
        self.element.take()
    }
}

/// `<br>`: produces a line break, refuses everything.
pub struct LineBreakWorker {
    element: Option<LayoutElement>,
}

impl LineBreakWorker {
    pub fn new() -> Self {
        Self {
            element: Some(LayoutElement::new(ElementKind::LineBreak, "br")),
        }
    }
}

impl TagWorker for LineBreakWorker {
    fn process_content(&mut self, _text: &str) -> bool {
        false
    }

    fn process_child(&mut self, _child: LayoutElement) -> bool {
        false
    }

    fn process_end(&mut self, _node: &Node, _styles: &StyleMap) {}

    fn take_element(&mut self) -> Option<LayoutElement> {
        self.element.take()
    }
}

/// `input` / `textarea`: a form field whose synthesized `::placeholder`
/// child lands in the element's placeholder slot instead of the child list.
pub struct FormFieldWorker {
    element: Option<LayoutElement>,
}

impl FormFieldWorker {
    pub fn new(node: &Node) -> Self {
        let tag = node.tag().unwrap_or_else(|| "input".to_string());
        let mut element = LayoutElement::new(ElementKind::FormField, tag);
        element.text = node.attr("value");
        Self {
            element: Some(element),
        }
    }
}

impl TagWorker for FormFieldWorker {
    fn process_content(&mut self, text: &str) -> bool {
        // textarea content becomes the field value
        if let Some(element) = self.element.as_mut() {
            match element.text.as_mut() {
                Some(existing) => existing.push_str(text),
                None => element.text = Some(text.to_string()),
            }
            true
        } else {
            false
        }
    }

    fn process_child(&mut self, child: LayoutElement) -> bool {
        let Some(element) = self.element.as_mut() else {
            return false;
        };
        if child.tag == dom::TAG_PLACEHOLDER {
            element.placeholder = Some(Box::new(child));
            true
        } else {
            false
        }
    }

    fn process_end(&mut self, node: &Node, _styles: &StyleMap) {
        if let Some(element) = self.element.as_mut() {
            if let Some(id) = node.attr("id") {
                element.destination = Some(id);
            }
        }
    }

    fn take_element(&mut self) -> Option<LayoutElement> {
        self.element.take()
    }
}

pub type WorkerFactory = Box<dyn Fn(&Node, &StyleMap) -> Box<dyn TagWorker>>;

/// Immutable (tag, optional display refinement) -> factory lookup, built at
/// startup and carried by the processor context. Lookup tries the refined
/// key first, then the tag alone.
pub struct TagWorkerRegistry {
    factories: HashMap<(String, Option<Display>), WorkerFactory>,
}

impl TagWorkerRegistry {
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    pub fn register(&mut self, tag: &str, display: Option<Display>, factory: WorkerFactory) {
        self.factories.insert((tag.to_string(), display), factory);
    }

    pub fn create(&self, tag: &str, display: Display, node: &Node, styles: &StyleMap) -> Option<Box<dyn TagWorker>> {
        self.factories
            .get(&(tag.to_string(), Some(display)))
            .or_else(|| self.factories.get(&(tag.to_string(), None)))
            .map(|factory| factory(node, styles))
    }

    pub fn has(&self, tag: &str) -> bool {
        self.factories.contains_key(&(tag.to_string(), None))
    }
}

const BLOCK_TAGS: &[&str] = &[
    "html", "body", "div", "p", "h1", "h2", "h3", "h4", "h5", "h6", "ul", "ol", "li", "section",
    "article", "header", "footer", "main", "nav", "aside", "blockquote", "pre", "table", "figure",
    "figcaption", "address", "hr",
];

const INLINE_TAGS: &[&str] = &[
    "span", "a", "b", "i", "u", "em", "strong", "small", "sub", "sup", "code", "label", "q",
    "cite", "abbr", "mark", "time",
];

pub fn default_registry() -> TagWorkerRegistry {
    let mut registry = TagWorkerRegistry::empty();
    for tag in BLOCK_TAGS {
        registry.register(tag, None, Box::new(|node, _| Box::new(ContainerWorker::block(node))));
        // display refinement: a block tag forced inline gets the inline worker
        registry.register(
            tag,
            Some(Display::Inline),
            Box::new(|node, _| Box::new(ContainerWorker::inline(node))),
        );
    }
    for tag in INLINE_TAGS {
        registry.register(tag, None, Box::new(|node, _| Box::new(ContainerWorker::inline(node))));
        registry.register(
            tag,
            Some(Display::Block),
            Box::new(|node, _| Box::new(ContainerWorker::block(node))),
        );
    }
    registry.register("br", None, Box::new(|_, _| Box::new(LineBreakWorker::new())));
    for tag in ["input", "textarea"] {
        registry.register(tag, None, Box::new(|node, _| Box::new(FormFieldWorker::new(node))));
    }
    // synthesized pseudo-elements flow through ordinary container workers
    registry.register(
        dom::TAG_BEFORE,
        None,
        Box::new(|node, _| Box::new(ContainerWorker::inline(node))),
    );
    registry.register(
        dom::TAG_AFTER,
        None,
        Box::new(|node, _| Box::new(ContainerWorker::inline(node))),
    );
    registry.register(
        dom::TAG_PLACEHOLDER,
        None,
        Box::new(|node, _| Box::new(ContainerWorker::inline(node))),
    );
    registry
}
