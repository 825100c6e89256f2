use crate::element::LayoutElement;
use std::collections::HashMap;

/// Which occurrence of a running element a margin box picks up, per the
/// `element(name, policy)` argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occurrence {
    /// Value at the start of the page (last element from earlier pages).
    Start,
    /// First occurrence assigned to the page, else the start value.
    First,
    /// Last occurrence assigned to the page, else the start value.
    Last,
    /// Like `first`, but nothing on the page the element first appears on.
    FirstExcept,
}

impl Occurrence {
    pub fn parse(raw: &str) -> Occurrence {
        match raw.trim() {
            "start" => Occurrence::Start,
            "last" => Occurrence::Last,
            "first-except" => Occurrence::FirstExcept,
            _ => Occurrence::First,
        }
    }
}

/// An element pulled out of normal flow by `position: running(name)`,
/// waiting to be re-inserted into margin boxes. The page assignment is
/// filled in lazily once layout has placed the surrounding content.
#[derive(Debug, Clone)]
pub struct RunningElement {
    pub name: String,
    pub occurrence: usize,
    pub element: LayoutElement,
    pub page_number: Option<usize>,
    pub first_on_page: bool,
}

#[derive(Debug, Default)]
pub struct RunningElementManager {
    by_name: HashMap<String, Vec<RunningElement>>,
}

impl RunningElementManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register in document order; the occurrence ordinal is per name.
    pub fn register(&mut self, name: &str, element: LayoutElement) -> usize {
        let entries = self.by_name.entry(name.to_string()).or_default();
        let ordinal = entries.len();
        entries.push(RunningElement {
            name: name.to_string(),
            occurrence: ordinal,
            element,
            page_number: None,
            first_on_page: false,
        });
        ordinal
    }

    pub fn assign_page(&mut self, name: &str, occurrence: usize, page: usize, first_on_page: bool) {
        if let Some(entries) = self.by_name.get_mut(name) {
            if let Some(entry) = entries.get_mut(occurrence) {
                entry.page_number = Some(page);
                entry.first_on_page = first_on_page;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Resolve `element(name, policy)` for a concrete page. Entries with no
    /// page assignment yet are ignored.
    pub fn lookup(&self, name: &str, policy: Occurrence, page: usize) -> Option<&RunningElement> {
        let entries = self.by_name.get(name)?;
        let start = entries
            .iter()
            .filter(|e| e.page_number.map(|p| p < page).unwrap_or(false))
            .last();
        let on_page: Vec<&RunningElement> = entries
            .iter()
            .filter(|e| e.page_number == Some(page))
            .collect();
        match policy {
            Occurrence::Start => start,
            Occurrence::First => on_page.first().copied().or(start),
            Occurrence::Last => on_page.last().copied().or(start),
            Occurrence::FirstExcept => {
                if on_page.is_empty() { start } else { None }
            }
        }
    }

    pub fn clear(&mut self) {
        self.by_name.clear();
    }
}
