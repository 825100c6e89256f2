use crate::types::{Margins, Pt, Rect, Size};

/// The sixteen standardized page-margin boxes, clockwise from the top-left
/// corner. Corner boxes are sized directly from the page margins; the twelve
/// edge thirds go through the dimension solver.
pub const MARGIN_BOX_NAMES: [&str; 16] = [
    "top-left-corner",
    "top-left",
    "top-center",
    "top-right",
    "top-right-corner",
    "right-top",
    "right-middle",
    "right-bottom",
    "bottom-right-corner",
    "bottom-right",
    "bottom-center",
    "bottom-left",
    "bottom-left-corner",
    "left-bottom",
    "left-middle",
    "left-top",
];

pub fn slot_index(name: &str) -> Option<usize> {
    MARGIN_BOX_NAMES.iter().position(|n| *n == name)
}

pub const CORNER_SLOTS: [usize; 4] = [0, 4, 8, 12];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Top,
    Right,
    Bottom,
    Left,
}

impl Edge {
    pub const ALL: [Edge; 4] = [Edge::Top, Edge::Right, Edge::Bottom, Edge::Left];

    /// Global slot indices of this edge's A (start), B (middle), C (end).
    pub fn slots(self) -> [usize; 3] {
        match self {
            Edge::Top => [1, 2, 3],
            Edge::Right => [5, 6, 7],
            Edge::Bottom => [11, 10, 9],
            Edge::Left => [15, 14, 13],
        }
    }

    /// Whether the distributed dimension runs horizontally.
    pub fn is_horizontal(self) -> bool {
        matches!(self, Edge::Top | Edge::Bottom)
    }
}

fn huge_pt() -> Pt {
    // Large but safe sentinel for "unconstrained".
    Pt::from_f32(1.0e9)
}

/// Sizing inputs for one edge-third slot. `fixed` is `None` for auto, in
/// which case the content-driven extents (measured once at an effectively
/// unconstrained size) participate in the distribution.
#[derive(Debug, Clone, Copy)]
pub struct SlotConstraints {
    pub fixed: Option<Pt>,
    pub min: Pt,
    pub max: Pt,
    pub content_min: Pt,
    pub content_max: Pt,
}

impl SlotConstraints {
    pub fn auto(content_min: Pt, content_max: Pt) -> Self {
        Self {
            fixed: None,
            min: Pt::ZERO,
            max: huge_pt(),
            content_min,
            content_max,
        }
    }

    pub fn fixed(value: Pt) -> Self {
        Self {
            fixed: Some(value),
            min: Pt::ZERO,
            max: huge_pt(),
            content_min: Pt::ZERO,
            content_max: Pt::ZERO,
        }
    }

    pub fn with_min(mut self, min: Pt) -> Self {
        self.min = min;
        self
    }

    pub fn with_max(mut self, max: Pt) -> Self {
        self.max = max;
        self
    }

    fn is_auto(&self) -> bool {
        self.fixed.is_none()
    }
}

/// Distribute `available` between two boxes given their (min, max) content
/// extents. Max extents that fit are honored with leftover shared by
/// max-share; otherwise mins are honored with leftover weighted by
/// (max - min); otherwise both get their min and may overflow.
fn flex_distribute(available: Pt, a: (Pt, Pt), b: (Pt, Pt)) -> (Pt, Pt) {
    let (a_min, a_max) = a;
    let (b_min, b_max) = b;
    let max_sum = a_max + b_max;
    let min_sum = a_min + b_min;
    if max_sum <= available {
        let leftover = available - max_sum;
        if max_sum.is_zero() {
            return (available / 2, available - available / 2);
        }
        let a_share = leftover.mul_div(a_max, max_sum);
        return (a_max + a_share, b_max + (leftover - a_share));
    }
    if min_sum <= available {
        let leftover = available - min_sum;
        let a_weight = a_max - a_min;
        let b_weight = b_max - b_min;
        let weight_sum = a_weight + b_weight;
        if weight_sum.is_zero() {
            return (a_min + leftover / 2, b_min + (leftover - leftover / 2));
        }
        let a_share = leftover.mul_div(a_weight, weight_sum);
        return (a_min + a_share, b_min + (leftover - a_share));
    }
    (a_min, b_min)
}

fn content_extents(slot: &Option<SlotConstraints>) -> (Pt, Pt) {
    match slot {
        Some(s) if s.is_auto() => (s.content_min, s.content_max),
        _ => (Pt::ZERO, Pt::ZERO),
    }
}

/// One solving pass over an edge, before min/max reclamping.
fn solve_once(available: Pt, slots: &[Option<SlotConstraints>; 3]) -> [Pt; 3] {
    let [a, b, c] = slots;
    if a.is_none() && b.is_none() && c.is_none() {
        return [Pt::ZERO; 3];
    }

    let Some(b) = b else {
        // distribute between A and C only
        return match (a, c) {
            (Some(a), None) => {
                let value = a.fixed.unwrap_or(available);
                [value, Pt::ZERO, Pt::ZERO]
            }
            (None, Some(c)) => {
                let value = c.fixed.unwrap_or(available);
                [Pt::ZERO, Pt::ZERO, value]
            }
            (Some(a), Some(c)) => match (a.fixed, c.fixed) {
                (None, None) => {
                    let (av, cv) = flex_distribute(
                        available,
                        (a.content_min, a.content_max),
                        (c.content_min, c.content_max),
                    );
                    [av, Pt::ZERO, cv]
                }
                (Some(av), None) => [av, Pt::ZERO, available - av],
                (None, Some(cv)) => [available - cv, Pt::ZERO, cv],
                (Some(av), Some(cv)) => [av, Pt::ZERO, cv],
            },
            (None, None) => [Pt::ZERO; 3],
        };
    };
    let (a_cmin, a_cmax) = content_extents(a);
    let (c_cmin, c_cmax) = content_extents(c);
    // virtual AC box: twice the larger of A's and C's extents, mirroring the
    // rule that A and C end up equal when both are auto
    let half_min = a_cmin.max(c_cmin);
    let half_max = a_cmax.max(c_cmax);
    let ac_min = half_min + half_min;
    let ac_max = half_max + half_max;

    let b_value = match b.fixed {
        Some(value) => value,
        None => {
            let (bv, _ac) =
                flex_distribute(available, (b.content_min, b.content_max), (ac_min, ac_max));
            bv
        }
    };
    let remainder = available - b_value;

    if b.fixed.is_some() {
        // fixed middle: each auto side gets its content capped at the
        // half-remainder, nudged by one unit
        let side = |slot: &Option<SlotConstraints>, own_cmax: Pt| -> Pt {
            match slot {
                None => Pt::ZERO,
                Some(s) => match s.fixed {
                    Some(value) => value,
                    None => own_cmax.min(remainder / 2) + Pt::quantum(),
                },
            }
        };
        return [side(a, a_cmax), b_value, side(c, c_cmax)];
    }

    // auto middle: the remainder left after B and any fixed side goes to the
    // auto sides, split evenly when both exist so A and C stay symmetric
    let fixed_side = |slot: &Option<SlotConstraints>| slot.as_ref().and_then(|s| s.fixed);
    let auto_count = [a, c]
        .iter()
        .filter(|slot| slot.as_ref().map(|s| s.is_auto()).unwrap_or(false))
        .count() as i32;
    let fixed_total = fixed_side(a).unwrap_or(Pt::ZERO) + fixed_side(c).unwrap_or(Pt::ZERO);
    let auto_space = (remainder - fixed_total).max(Pt::ZERO);
    let side = |slot: &Option<SlotConstraints>| -> Pt {
        match slot {
            None => Pt::ZERO,
            Some(s) => match s.fixed {
                Some(value) => value,
                None => auto_space / auto_count.max(1),
            },
        }
    };
    [side(a), b_value, side(c)]
}

/// Solve one edge: run the distribution, then clamp any auto slot that
/// violated its explicit min/max and re-run with it fixed at the bound,
/// until no slot reclamps. Negative results are floored to zero last.
pub fn solve_edge(available: Pt, slots: [Option<SlotConstraints>; 3]) -> [Pt; 3] {
    let mut slots = slots;
    // each pass converts at least one auto slot to fixed, so three passes
    // after the initial solve always suffice
    let mut result = solve_once(available, &slots);
    for _ in 0..3 {
        let mut reclamped = false;
        for (index, slot) in slots.iter_mut().enumerate() {
            let Some(s) = slot else { continue };
            if !s.is_auto() {
                continue;
            }
            let clamped = result[index].clamp(s.min, s.max);
            if clamped != result[index] {
                s.fixed = Some(clamped);
                reclamped = true;
            }
        }
        if !reclamped {
            break;
        }
        result = solve_once(available, &slots);
    }
    for value in result.iter_mut() {
        *value = value.max(Pt::ZERO);
    }
    result
}

/// Margin-area geometry for one resolved page: corner rectangles direct from
/// the margins, edge-third rectangles from solved extents. Coordinates are
/// top-left based, y growing downward.
#[derive(Debug, Clone, Copy)]
pub struct MarginArea {
    pub page_size: Size,
    pub margins: Margins,
}

impl MarginArea {
    pub fn new(page_size: Size, margins: Margins) -> Self {
        Self { page_size, margins }
    }

    pub fn corner_rect(&self, slot: usize) -> Option<Rect> {
        let w = self.page_size.width;
        let h = self.page_size.height;
        let m = self.margins;
        match slot {
            0 => Some(Rect::new(Pt::ZERO, Pt::ZERO, m.left, m.top)),
            4 => Some(Rect::new(w - m.right, Pt::ZERO, m.right, m.top)),
            8 => Some(Rect::new(w - m.right, h - m.bottom, m.right, m.bottom)),
            12 => Some(Rect::new(Pt::ZERO, h - m.bottom, m.left, m.bottom)),
            _ => None,
        }
    }

    /// Span available to an edge's three interior slots (between corners).
    pub fn available(&self, edge: Edge) -> Pt {
        let m = self.margins;
        if edge.is_horizontal() {
            self.page_size.width - m.left - m.right
        } else {
            self.page_size.height - m.top - m.bottom
        }
    }

    /// Place the solved [A, B, C] extents along the edge strip. A starts at
    /// the strip start, C ends at the strip end, and B is centered within
    /// the full span regardless of how much of it B was allocated.
    pub fn edge_rects(&self, edge: Edge, extents: [Pt; 3]) -> [Rect; 3] {
        let m = self.margins;
        let span = self.available(edge);
        let [a, b, c] = extents;
        if edge.is_horizontal() {
            let y = if edge == Edge::Top {
                Pt::ZERO
            } else {
                self.page_size.height - m.bottom
            };
            let thickness = if edge == Edge::Top { m.top } else { m.bottom };
            let start = m.left;
            [
                Rect::new(start, y, a, thickness),
                Rect::new(start + (span - b) / 2, y, b, thickness),
                Rect::new(start + span - c, y, c, thickness),
            ]
        } else {
            let x = if edge == Edge::Left {
                Pt::ZERO
            } else {
                self.page_size.width - m.right
            };
            let thickness = if edge == Edge::Left { m.left } else { m.right };
            let start = m.top;
            [
                Rect::new(x, start, thickness, a),
                Rect::new(x, start + (span - b) / 2, thickness, b),
                Rect::new(x, start + span - c, thickness, c),
            ]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt(v: f32) -> Pt {
        Pt::from_f32(v)
    }

    fn assert_close(actual: Pt, expected: f32) {
        assert!(
            (actual.to_f32() - expected).abs() < 0.02,
            "expected {} got {}",
            expected,
            actual.to_f32()
        );
    }

    #[test]
    fn all_slots_absent_solve_to_zero() {
        let result = solve_edge(pt(200.0), [None, None, None]);
        assert_eq!(result, [Pt::ZERO; 3]);
    }

    #[test]
    fn single_center_slot_takes_the_full_span() {
        // @top-center alone: width equal to the full top-margin width
        let available = pt(300.0);
        let result = solve_edge(
            available,
            [None, Some(SlotConstraints::auto(pt(20.0), pt(60.0))), None],
        );
        assert_close(result[1], 300.0);
        assert_eq!(result[0], Pt::ZERO);
        assert_eq!(result[2], Pt::ZERO);
    }

    #[test]
    fn fixed_pair_keeps_declared_widths() {
        // @top-left and @top-right at 2cm each inside a 10cm strip
        let two_cm = pt(2.0 * 72.0 / 2.54);
        let available = pt(10.0 * 72.0 / 2.54);
        let result = solve_edge(
            available,
            [
                Some(SlotConstraints::fixed(two_cm)),
                None,
                Some(SlotConstraints::fixed(two_cm)),
            ],
        );
        assert_close(result[0], 56.69);
        assert_eq!(result[1], Pt::ZERO);
        assert_close(result[2], 56.69);
    }

    #[test]
    fn two_auto_slots_without_middle_tile_the_span() {
        let available = pt(240.0);
        let result = solve_edge(
            available,
            [
                Some(SlotConstraints::auto(pt(10.0), pt(30.0))),
                None,
                Some(SlotConstraints::auto(pt(20.0), pt(90.0))),
            ],
        );
        let total: Pt = result.iter().copied().sum();
        assert_close(total, 240.0);
        // leftover beyond max extents is shared proportionally to max share
        assert!(result[2] > result[0]);
    }

    #[test]
    fn tiling_invariant_holds_across_auto_fixed_combinations() {
        let available = pt(300.0);
        let auto = || Some(SlotConstraints::auto(pt(15.0), pt(45.0)));
        let fixed = || Some(SlotConstraints::fixed(pt(80.0)));
        // the fixed-middle branch deliberately caps sides below the span, so
        // it is exercised separately; every auto-middle combination tiles
        let combos: Vec<[Option<SlotConstraints>; 3]> = vec![
            [auto(), auto(), auto()],
            [fixed(), auto(), auto()],
            [auto(), auto(), fixed()],
            [auto(), auto(), None],
            [None, auto(), auto()],
            [auto(), None, auto()],
            [fixed(), None, auto()],
            [auto(), None, None],
            [None, None, auto()],
            [None, auto(), None],
        ];
        for (index, combo) in combos.into_iter().enumerate() {
            let result = solve_edge(available, combo);
            let total: Pt = result.iter().copied().sum();
            assert!(
                (total.to_f32() - 300.0).abs() < 0.05,
                "combo {} tiled to {} instead of 300",
                index,
                total.to_f32()
            );
            for value in result {
                assert!(value >= Pt::ZERO);
            }
        }
    }

    #[test]
    fn auto_sides_are_symmetric_around_an_auto_middle() {
        let result = solve_edge(
            pt(400.0),
            [
                Some(SlotConstraints::auto(pt(10.0), pt(40.0))),
                Some(SlotConstraints::auto(pt(30.0), pt(120.0))),
                Some(SlotConstraints::auto(pt(5.0), pt(90.0))),
            ],
        );
        assert_eq!(result[0], result[2], "A and C must come out equal");
        let total: Pt = result.iter().copied().sum();
        assert_close(total, 400.0);
    }

    #[test]
    fn solver_is_idempotent_once_fixed_at_solution() {
        let available = pt(360.0);
        let first = solve_edge(
            available,
            [
                Some(SlotConstraints::auto(pt(10.0), pt(50.0))),
                Some(SlotConstraints::auto(pt(20.0), pt(70.0))),
                Some(SlotConstraints::auto(pt(10.0), pt(65.0))),
            ],
        );
        let second = solve_edge(
            available,
            [
                Some(SlotConstraints::fixed(first[0])),
                Some(SlotConstraints::fixed(first[1])),
                Some(SlotConstraints::fixed(first[2])),
            ],
        );
        assert_eq!(first, second, "re-solving fixed values must not drift");
    }

    #[test]
    fn explicit_max_reclamps_and_redistributes() {
        let available = pt(300.0);
        let result = solve_edge(
            available,
            [
                Some(SlotConstraints::auto(pt(10.0), pt(20.0)).with_max(pt(30.0))),
                None,
                Some(SlotConstraints::auto(pt(10.0), pt(20.0))),
            ],
        );
        assert_close(result[0], 30.0);
        assert_close(result[2], 270.0);
    }

    #[test]
    fn explicit_min_wins_over_distribution() {
        let result = solve_edge(
            pt(100.0),
            [
                Some(SlotConstraints::auto(pt(5.0), pt(10.0)).with_min(pt(60.0))),
                None,
                Some(SlotConstraints::auto(pt(5.0), pt(10.0))),
            ],
        );
        assert_close(result[0], 60.0);
        assert_close(result[2], 40.0);
    }

    #[test]
    fn overconstrained_minimums_overflow_without_negatives() {
        let result = solve_edge(
            pt(50.0),
            [
                Some(SlotConstraints::auto(pt(40.0), pt(80.0))),
                None,
                Some(SlotConstraints::auto(pt(40.0), pt(80.0))),
            ],
        );
        assert_close(result[0], 40.0);
        assert_close(result[2], 40.0);
        for value in result {
            assert!(value >= Pt::ZERO);
        }
    }

    #[test]
    fn fixed_middle_gives_sides_capped_content_plus_epsilon() {
        let available = pt(300.0);
        let result = solve_edge(
            available,
            [
                Some(SlotConstraints::auto(pt(10.0), pt(40.0))),
                Some(SlotConstraints::fixed(pt(100.0))),
                Some(SlotConstraints::auto(pt(10.0), pt(400.0))),
            ],
        );
        // A: content max 40 fits in (300-100)/2 = 100
        assert_close(result[0], 40.0);
        // C: capped at the half-remainder
        assert_close(result[2], 100.0);
        assert_close(result[1], 100.0);
    }

    #[test]
    fn corner_rects_come_straight_from_margins() {
        let area = MarginArea::new(
            Size::new(pt(600.0), pt(800.0)),
            Margins {
                top: pt(50.0),
                right: pt(40.0),
                bottom: pt(60.0),
                left: pt(30.0),
            },
        );
        let tl = area.corner_rect(0).unwrap();
        assert_eq!(tl, Rect::new(Pt::ZERO, Pt::ZERO, pt(30.0), pt(50.0)));
        let br = area.corner_rect(8).unwrap();
        assert_eq!(br.x, pt(560.0));
        assert_eq!(br.y, pt(740.0));
        assert!(area.corner_rect(2).is_none());
    }

    #[test]
    fn middle_rect_is_centered_in_the_full_span() {
        let area = MarginArea::new(Size::new(pt(500.0), pt(700.0)), Margins::all(50.0));
        // span is 400; B allocated 100 but still centered at x = 50 + 150
        let rects = area.edge_rects(Edge::Top, [pt(180.0), pt(100.0), pt(20.0)]);
        assert_eq!(rects[1].x, pt(200.0));
        assert_eq!(rects[0].x, pt(50.0));
        assert_eq!(rects[2].right(), pt(450.0));
        for rect in rects {
            assert_eq!(rect.height, pt(50.0));
            assert_eq!(rect.y, Pt::ZERO);
        }
    }

    #[test]
    fn edge_and_corner_rects_never_overlap() {
        let area = MarginArea::new(Size::new(pt(500.0), pt(700.0)), Margins::all(50.0));
        let solved = solve_edge(
            area.available(Edge::Top),
            [
                Some(SlotConstraints::auto(pt(10.0), pt(100.0))),
                Some(SlotConstraints::auto(pt(10.0), pt(100.0))),
                Some(SlotConstraints::auto(pt(10.0), pt(100.0))),
            ],
        );
        let rects = area.edge_rects(Edge::Top, solved);
        for corner in CORNER_SLOTS {
            if let Some(corner_rect) = area.corner_rect(corner) {
                for rect in &rects {
                    assert!(
                        !rect.intersects(corner_rect),
                        "edge slot {:?} overlaps corner {}",
                        rect,
                        corner
                    );
                }
            }
        }
        assert!(
            rects[0].right() <= rects[1].x + Pt::quantum(),
            "A may touch but never overlap B"
        );
    }

    #[test]
    fn vertical_edges_distribute_heights() {
        let area = MarginArea::new(Size::new(pt(500.0), pt(700.0)), Margins::all(50.0));
        assert_eq!(area.available(Edge::Left), pt(600.0));
        let rects = area.edge_rects(Edge::Left, [pt(200.0), pt(200.0), pt(200.0)]);
        assert_eq!(rects[0].y, pt(50.0));
        assert_eq!(rects[2].bottom(), pt(650.0));
        for rect in rects {
            assert_eq!(rect.width, pt(50.0));
            assert_eq!(rect.x, Pt::ZERO);
        }
    }

    #[test]
    fn slot_names_map_to_expected_indices() {
        assert_eq!(slot_index("top-left-corner"), Some(0));
        assert_eq!(slot_index("top-center"), Some(2));
        assert_eq!(slot_index("bottom-center"), Some(10));
        assert_eq!(slot_index("left-middle"), Some(14));
        assert_eq!(slot_index("inside-top"), None);
        assert_eq!(Edge::Bottom.slots(), [11, 10, 9]);
    }
}
