//! Grid geometry for widgets.
//!
//! Persisted layouts live in absolute model coordinates (`ModelLayout`). The
//! presentation layer shifts them by a virtual origin into `RenderLayout` so
//! the visible bounding box starts at (0, 0). The two types never convert
//! implicitly; the only way back to model space is `normalize_committed`,
//! used when the user commits a layout edit.

use serde::{Deserialize, Serialize};

use super::protocol::TemplateType;

/// px per grid column
pub const CELL_WIDTH: u32 = 80;
/// px per grid row
pub const ROW_HEIGHT: u32 = 40;
pub const GRID_GAP: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    pub w: u32,
    pub h: u32,
}

/// Default size of a freshly placed widget, which is also its minimum.
pub fn min_size(template: &TemplateType) -> GridSize {
    match template {
        TemplateType::Gauge => GridSize { w: 2, h: 3 },
        TemplateType::BarList => GridSize { w: 3, h: 3 },
        TemplateType::KeyValue => GridSize { w: 2, h: 3 },
        TemplateType::Text => GridSize { w: 2, h: 2 },
        TemplateType::Sparkline => GridSize { w: 3, h: 2 },
        _ => GridSize { w: 2, h: 3 },
    }
}

/// Widget rectangle as persisted in the config document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelLayout {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl ModelLayout {
    pub fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }

    pub fn fits(&self, min: GridSize) -> bool {
        self.w >= min.w && self.h >= min.h
    }

    /// Enlarge in place to at least `min`. Returns whether anything changed.
    pub fn grow_to(&mut self, min: GridSize) -> bool {
        if self.fits(min) {
            return false;
        }
        self.w = self.w.max(min.w);
        self.h = self.h.max(min.h);
        true
    }
}

/// Widget rectangle in render space (after the virtual origin shift).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderLayout {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl RenderLayout {
    fn overlaps(&self, x: i32, y: i32, w: u32, h: u32) -> bool {
        x < self.x + self.w as i32
            && x + w as i32 > self.x
            && y < self.y + self.h as i32
            && y + h as i32 > self.y
    }
}

/// Read-only render shift: the minimum x,y among the given layouts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VirtualOrigin {
    pub x: i32,
    pub y: i32,
}

impl VirtualOrigin {
    pub fn of<'a, I>(layouts: I) -> Self
    where
        I: IntoIterator<Item = &'a ModelLayout>,
    {
        let mut iter = layouts.into_iter();
        let Some(first) = iter.next() else {
            return Self::default();
        };
        iter.fold(
            Self {
                x: first.x,
                y: first.y,
            },
            |acc, l| Self {
                x: acc.x.min(l.x),
                y: acc.y.min(l.y),
            },
        )
    }

    pub fn to_render(&self, model: &ModelLayout) -> RenderLayout {
        RenderLayout {
            x: model.x - self.x,
            y: model.y - self.y,
            w: model.w,
            h: model.h,
        }
    }
}

/// Re-normalize a committed edit so its minimum (x, y) becomes (0, 0).
pub fn normalize_committed(edited: &[(String, RenderLayout)]) -> Vec<(String, ModelLayout)> {
    let min_x = edited.iter().map(|(_, l)| l.x).min().unwrap_or(0);
    let min_y = edited.iter().map(|(_, l)| l.y).min().unwrap_or(0);

    edited
        .iter()
        .map(|(id, l)| {
            (
                id.clone(),
                ModelLayout {
                    x: l.x - min_x,
                    y: l.y - min_y,
                    w: l.w,
                    h: l.h,
                },
            )
        })
        .collect()
}

/// A widget waiting to be placed on the render grid.
#[derive(Debug, Clone)]
pub struct PlacementRequest {
    pub id: String,
    pub template: TemplateType,
    pub saved: Option<ModelLayout>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub id: String,
    pub layout: RenderLayout,
    pub min: GridSize,
}

fn has_collision(placed: &[Placement], x: i32, y: i32, w: u32, h: u32) -> bool {
    placed.iter().any(|p| p.layout.overlaps(x, y, w, h))
}

/// Scan rows downward for the first free slot.
fn find_free_position(placed: &[Placement], w: u32, h: u32, columns: u32) -> (i32, i32) {
    let last_col = columns.saturating_sub(w) as i32;
    let mut row = 0;
    loop {
        for col in 0..=last_col {
            if !has_collision(placed, col, row, w, h) {
                return (col, row);
            }
        }
        row += 1;
    }
}

/// Map enabled widgets to render rectangles.
///
/// Saved rectangles are shifted by `origin` and grown to their minimum size;
/// widgets without a layout, or whose saved spot collides with an earlier
/// one, go to the first free slot.
pub fn place_widgets(
    widgets: &[PlacementRequest],
    origin: VirtualOrigin,
    columns: u32,
) -> Vec<Placement> {
    let columns = columns.max(1);
    let mut placed: Vec<Placement> = Vec::with_capacity(widgets.len());

    if widgets.iter().all(|w| w.saved.is_none()) {
        for (idx, widget) in widgets.iter().enumerate() {
            let min = min_size(&widget.template);
            let idx = idx as u32;
            placed.push(Placement {
                id: widget.id.clone(),
                layout: RenderLayout {
                    x: ((idx % columns) * min.w) as i32,
                    y: ((idx / columns) * min.h) as i32,
                    w: min.w,
                    h: min.h,
                },
                min,
            });
        }
        return placed;
    }

    for widget in widgets {
        let min = min_size(&widget.template);
        let layout = match widget.saved {
            Some(saved) => {
                let mut render = origin.to_render(&saved);
                render.w = render.w.max(min.w);
                render.h = render.h.max(min.h);
                if has_collision(&placed, render.x, render.y, render.w, render.h) {
                    let (x, y) = find_free_position(&placed, render.w, render.h, columns);
                    render.x = x;
                    render.y = y;
                }
                render
            }
            None => {
                let (x, y) = find_free_position(&placed, min.w, min.h, columns);
                RenderLayout {
                    x,
                    y,
                    w: min.w,
                    h: min.h,
                }
            }
        };
        placed.push(Placement {
            id: widget.id.clone(),
            layout,
            min,
        });
    }

    placed
}

/// Visible width in grid columns, derived from the placed content.
pub fn content_columns(placed: &[Placement]) -> u32 {
    placed
        .iter()
        .map(|p| (p.layout.x + p.layout.w as i32).max(0) as u32)
        .max()
        .unwrap_or(0)
}

/// Pixel width of `columns` grid columns including gaps.
pub fn grid_width_px(columns: u32) -> u32 {
    if columns == 0 {
        return 0;
    }
    columns * CELL_WIDTH + (columns - 1) * GRID_GAP
}
