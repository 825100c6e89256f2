use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Recoverable conditions surfaced during a conversion. None of these abort
/// the conversion; they are recorded and, when a sink is attached, written
/// out as JSON lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    NoWorkerForTag,
    NoApplierForTag,
    WorkerRejectedChild,
    NoConsumerForText,
    RelayoutLimitExceeded,
    MarginBoxContentUndrawable,
    UnparseablePageValue,
}

impl DiagnosticKind {
    pub fn key(self) -> &'static str {
        match self {
            DiagnosticKind::NoWorkerForTag => "walker.no_worker_for_tag",
            DiagnosticKind::NoApplierForTag => "walker.no_applier_for_tag",
            DiagnosticKind::WorkerRejectedChild => "walker.worker_rejected_child",
            DiagnosticKind::NoConsumerForText => "walker.no_consumer_for_text",
            DiagnosticKind::RelayoutLimitExceeded => "layout.relayout_limit_exceeded",
            DiagnosticKind::MarginBoxContentUndrawable => "page.margin_box_undrawable",
            DiagnosticKind::UnparseablePageValue => "page.unparseable_value",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub detail: String,
}

#[derive(Clone, Default)]
pub struct Diagnostics {
    inner: Arc<Mutex<DiagnosticState>>,
}

#[derive(Default)]
struct DiagnosticState {
    events: Vec<Diagnostic>,
    counters: HashMap<&'static str, u64>,
    sink: Option<BufWriter<File>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        let diags = Self::default();
        if let Ok(mut state) = diags.inner.lock() {
            state.sink = Some(BufWriter::new(file));
        }
        Ok(diags)
    }

    pub fn report(&self, kind: DiagnosticKind, detail: impl Into<String>) {
        let detail = detail.into();
        if let Ok(mut state) = self.inner.lock() {
            *state.counters.entry(kind.key()).or_insert(0) += 1;
            if let Some(sink) = state.sink.as_mut() {
                let _ = writeln!(
                    sink,
                    "{{\"type\":\"{}\",\"detail\":\"{}\"}}",
                    kind.key(),
                    json_escape(&detail)
                );
            }
            state.events.push(Diagnostic { kind, detail });
        }
    }

    pub fn count(&self, kind: DiagnosticKind) -> u64 {
        self.inner
            .lock()
            .map(|state| state.counters.get(kind.key()).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn events(&self) -> Vec<Diagnostic> {
        self.inner
            .lock()
            .map(|state| state.events.clone())
            .unwrap_or_default()
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            if let Some(sink) = state.sink.as_mut() {
                let _ = sink.flush();
            }
        }
    }
}

pub(crate) fn json_escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                out.push_str(&format!("\\u{:04x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}
