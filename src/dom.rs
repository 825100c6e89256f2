use crate::style::StyleMap;
use kuchiki::traits::TendrilSink;
use kuchiki::{NodeData, NodeRef};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

// Synthetic tag names for nodes created during the walk. They never collide
// with real HTML tag names.
pub const TAG_BEFORE: &str = "::before";
pub const TAG_AFTER: &str = "::after";
pub const TAG_PLACEHOLDER: &str = "::placeholder";
pub const TAG_TEXT: &str = "-folio-text";

pub struct ElementData {
    pub tag: String,
    pub attrs: RefCell<HashMap<String, String>>,
    // Populated by the walker right before the node is visited and cleared
    // right after, so long documents do not accumulate resolved maps.
    pub resolved_style: RefCell<Option<StyleMap>>,
}

pub enum NodeKind {
    Element(ElementData),
    Text(RefCell<String>),
}

pub struct NodeInner {
    pub kind: NodeKind,
    parent: RefCell<Weak<NodeInner>>,
    children: RefCell<Vec<Node>>,
}

/// Cheap handle to a document node. Children are owned top-down through the
/// handle's `Rc`; the parent link is a non-owning back-reference.
#[derive(Clone)]
pub struct Node(Rc<NodeInner>);

impl Node {
    pub fn new_element(tag: impl Into<String>) -> Node {
        Node(Rc::new(NodeInner {
            kind: NodeKind::Element(ElementData {
                tag: tag.into(),
                attrs: RefCell::new(HashMap::new()),
                resolved_style: RefCell::new(None),
            }),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        }))
    }

    pub fn new_text(text: impl Into<String>) -> Node {
        Node(Rc::new(NodeInner {
            kind: NodeKind::Text(RefCell::new(text.into())),
            parent: RefCell::new(Weak::new()),
            children: RefCell::new(Vec::new()),
        }))
    }

    pub fn append_child(&self, child: Node) {
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(child);
    }

    pub fn children(&self) -> Vec<Node> {
        self.0.children.borrow().clone()
    }

    pub fn has_children(&self) -> bool {
        !self.0.children.borrow().is_empty()
    }

    pub fn parent(&self) -> Option<Node> {
        self.0.parent.borrow().upgrade().map(Node)
    }

    pub fn element(&self) -> Option<&ElementData> {
        match &self.0.kind {
            NodeKind::Element(data) => Some(data),
            NodeKind::Text(_) => None,
        }
    }

    pub fn is_element(&self) -> bool {
        self.element().is_some()
    }

    pub fn tag(&self) -> Option<String> {
        self.element().map(|el| el.tag.clone())
    }

    pub fn text(&self) -> Option<String> {
        match &self.0.kind {
            NodeKind::Text(text) => Some(text.borrow().clone()),
            NodeKind::Element(_) => None,
        }
    }

    pub fn attr(&self, name: &str) -> Option<String> {
        self.element()
            .and_then(|el| el.attrs.borrow().get(name).cloned())
    }

    pub fn set_attr(&self, name: impl Into<String>, value: impl Into<String>) {
        if let Some(el) = self.element() {
            el.attrs.borrow_mut().insert(name.into(), value.into());
        }
    }

    pub fn set_resolved_style(&self, styles: StyleMap) {
        if let Some(el) = self.element() {
            *el.resolved_style.borrow_mut() = Some(styles);
        }
    }

    pub fn resolved_style(&self) -> Option<StyleMap> {
        self.element()
            .and_then(|el| el.resolved_style.borrow().clone())
    }

    pub fn clear_resolved_style(&self) {
        if let Some(el) = self.element() {
            *el.resolved_style.borrow_mut() = None;
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.tag()
            .map(|tag| tag.starts_with("::") || tag.starts_with("-folio-"))
            .unwrap_or(false)
    }

    /// Drop children synthesized by an earlier pass so a re-walk starts from
    /// the parsed document again.
    pub fn remove_synthetic_children(&self) {
        self.0
            .children
            .borrow_mut()
            .retain(|child| !child.is_synthetic());
    }

    /// Nearest ancestor element with the given tag, for upward queries like
    /// locating the `html` or `body` node.
    pub fn ancestor_with_tag(&self, tag: &str) -> Option<Node> {
        let mut cursor = self.parent();
        while let Some(node) = cursor {
            if node.tag().as_deref() == Some(tag) {
                return Some(node);
            }
            cursor = node.parent();
        }
        None
    }
}

/// Parse HTML text and lift the kuchiki tree into the walker's node model.
/// Returns the `html` element. Comments, doctype, and processing
/// instructions are dropped.
pub fn parse_document(html: &str) -> Node {
    let document = kuchiki::parse_html().one(html);
    let root = Node::new_element("html");
    if let Ok(html_el) = document.select_first("html") {
        copy_element_attrs(html_el.as_node(), &root);
        for child in html_el.as_node().children() {
            lift_node(&child, &root);
        }
    }
    root
}

fn copy_element_attrs(from: &NodeRef, to: &Node) {
    if let NodeData::Element(el) = from.data() {
        for (name, value) in el.attributes.borrow().map.iter() {
            to.set_attr(name.local.as_ref(), value.value.clone());
        }
    }
}

fn lift_node(node: &NodeRef, parent: &Node) {
    match node.data() {
        NodeData::Element(el) => {
            let lifted = Node::new_element(el.name.local.as_ref());
            copy_element_attrs(node, &lifted);
            for child in node.children() {
                lift_node(&child, &lifted);
            }
            parent.append_child(lifted);
        }
        NodeData::Text(text) => {
            let text = text.borrow();
            if !text.trim().is_empty() {
                parent.append_child(Node::new_text(text.to_string()));
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_document_lifts_elements_text_and_attributes() {
        let root = parse_document(
            r#"<html><body><div id="a" class="box">hello <span>world</span></div></body></html>"#,
        );
        assert_eq!(root.tag().as_deref(), Some("html"));
        let body = root
            .children()
            .into_iter()
            .find(|c| c.tag().as_deref() == Some("body"))
            .expect("body");
        let div = body.children().into_iter().next().expect("div");
        assert_eq!(div.tag().as_deref(), Some("div"));
        assert_eq!(div.attr("id").as_deref(), Some("a"));
        let kids = div.children();
        assert_eq!(kids.len(), 2);
        assert_eq!(kids[0].text().as_deref(), Some("hello "));
        assert_eq!(kids[1].tag().as_deref(), Some("span"));
    }

    #[test]
    fn parent_links_are_non_owning_back_references() {
        let parent = Node::new_element("div");
        let child = Node::new_element("span");
        parent.append_child(child.clone());
        assert_eq!(child.parent().and_then(|p| p.tag()).as_deref(), Some("div"));
        assert!(child.ancestor_with_tag("div").is_some());
        assert!(child.ancestor_with_tag("table").is_none());
    }

    #[test]
    fn synthetic_tags_are_flagged() {
        assert!(Node::new_element(TAG_BEFORE).is_synthetic());
        assert!(Node::new_element(TAG_TEXT).is_synthetic());
        assert!(!Node::new_element("div").is_synthetic());
    }

    #[test]
    fn comments_and_doctype_are_dropped() {
        let root = parse_document("<!DOCTYPE html><html><body><!-- note --><p>x</p></body></html>");
        let body = root
            .children()
            .into_iter()
            .find(|c| c.tag().as_deref() == Some("body"))
            .expect("body");
        assert_eq!(body.children().len(), 1);
        assert_eq!(body.children()[0].tag().as_deref(), Some("p"));
    }
}
