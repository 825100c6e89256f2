use crate::types::{Color, Pt, Rect, Size};

/// Recorded drawing operation. The PDF writer downstream replays these; this
/// crate only ever records.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    MoveTo { x: Pt, y: Pt },
    LineTo { x: Pt, y: Pt },
    Stroke,
    FillRect(Rect),
    StrokeRect(Rect),
    ClipRect(Rect),
    DrawString { x: Pt, y: Pt, text: String },
}

#[derive(Debug, Clone, Default)]
pub struct Canvas {
    pub commands: Vec<Command>,
}

impl Canvas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Filled rectangle with optional stroked border, the composite op page
    /// decorations are built from.
    pub fn draw_box(
        &mut self,
        rect: Rect,
        background: Option<Color>,
        border_width: Pt,
        border_color: Option<Color>,
    ) {
        self.push(Command::SaveState);
        if let Some(color) = background {
            self.push(Command::SetFillColor(color));
            self.push(Command::FillRect(rect));
        }
        if border_width > Pt::ZERO {
            self.push(Command::SetStrokeColor(border_color.unwrap_or(Color::BLACK)));
            self.push(Command::SetLineWidth(border_width));
            self.push(Command::StrokeRect(rect));
        }
        self.push(Command::RestoreState);
    }

    pub fn draw_line(&mut self, from: (Pt, Pt), to: (Pt, Pt), width: Pt) {
        self.push(Command::SaveState);
        self.push(Command::SetLineWidth(width));
        self.push(Command::MoveTo {
            x: from.0,
            y: from.1,
        });
        self.push(Command::LineTo { x: to.0, y: to.1 });
        self.push(Command::Stroke);
        self.push(Command::RestoreState);
    }
}

/// One physical page: its box rectangles plus ordered content streams.
/// `before` streams render under normal content (backgrounds), `after`
/// streams render over it (margin boxes, marks).
#[derive(Debug, Clone)]
pub struct Page {
    pub number: usize,
    pub media_box: Rect,
    pub bleed_box: Rect,
    pub trim_box: Rect,
    pub before: Vec<Canvas>,
    pub content: Canvas,
    pub after: Vec<Canvas>,
}

impl Page {
    pub fn new(number: usize, size: Size) -> Self {
        let media_box = Rect::new(Pt::ZERO, Pt::ZERO, size.width, size.height);
        Self {
            number,
            media_box,
            bleed_box: media_box,
            trim_box: media_box,
            before: Vec::new(),
            content: Canvas::new(),
            after: Vec::new(),
        }
    }

    /// Insert a content stream rendered before everything recorded so far.
    /// Returns its index into `before` as a handle.
    pub fn new_content_stream_before(&mut self) -> usize {
        self.before.push(Canvas::new());
        self.before.len() - 1
    }

    pub fn new_content_stream_after(&mut self) -> usize {
        self.after.push(Canvas::new());
        self.after.len() - 1
    }

    pub fn before_mut(&mut self, handle: usize) -> &mut Canvas {
        &mut self.before[handle]
    }

    pub fn after_mut(&mut self, handle: usize) -> &mut Canvas {
        &mut self.after[handle]
    }
}
