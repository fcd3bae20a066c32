//! Coverage overlay: paints the byte extent of every decoded instruction
//! onto an auxiliary surface aligned with the zoomed region of the primary
//! 2-D view.

use crate::classify::{Classifier, Role};
use crate::{Address, Insn, Rgba, Surface};

/// Region of the 2-D source view currently shown, in cell coordinates.
/// `x1`/`y1` are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ZoomRect {
    pub x0: usize,
    pub y0: usize,
    pub x1: usize,
    pub y1: usize,
}

impl ZoomRect {
    pub fn new(x0: usize, y0: usize, x1: usize, y1: usize) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> usize {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> usize {
        self.y1.saturating_sub(self.y0)
    }

    pub fn contains(&self, x: usize, y: usize) -> bool {
        x >= self.x0 && x < self.x1 && y >= self.y0 && y < self.y1
    }
}

/// Maps a linear byte offset to the cell it occupies in the 2-D view.
///
/// The overlay must use the same mapping as whatever lays out the primary
/// view, otherwise boxes drift away from the bytes they describe.
pub trait CellMap {
    fn cell(&self, offset: Address) -> (usize, usize);
}

/// Row-major layout with a fixed number of cells per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowMajor {
    width: usize,
}

impl RowMajor {
    /// A zero width is treated as one cell per row.
    pub fn new(width: usize) -> Self {
        Self {
            width: width.max(1),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }
}

impl CellMap for RowMajor {
    fn cell(&self, offset: Address) -> (usize, usize) {
        let w = self.width as Address;
        ((offset % w) as usize, (offset / w) as usize)
    }
}

/// Scale factors between zoom cells and overlay pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayGeometry {
    pub zoom: ZoomRect,
    pub scale_x: f32,
    pub scale_y: f32,
    /// Box size per cell, rounded up so neighbouring boxes leave no gaps
    pub cell_w: usize,
    pub cell_h: usize,
}

impl OverlayGeometry {
    /// `None` when the zoom rectangle is empty.
    pub fn new(zoom: ZoomRect, overlay_w: usize, overlay_h: usize) -> Option<Self> {
        if zoom.width() == 0 || zoom.height() == 0 {
            return None;
        }

        let scale_x = overlay_w as f32 / zoom.width() as f32;
        let scale_y = overlay_h as f32 / zoom.height() as f32;

        Some(Self {
            zoom,
            scale_x,
            scale_y,
            cell_w: scale_x.ceil() as usize,
            cell_h: scale_y.ceil() as usize,
        })
    }

    /// Top-left overlay pixel of a cell inside the zoom rectangle
    pub fn to_pixel(&self, x: usize, y: usize) -> (usize, usize) {
        let px = (x - self.zoom.x0) as f32 * self.scale_x;
        let py = (y - self.zoom.y0) as f32 * self.scale_y;
        (px as usize, py as usize)
    }
}

/// Cells inside `zoom` covered by `insn`, in walk order.
///
/// The walk starts at the cell of the first byte and steps right, wrapping
/// to the left edge of the zoom rectangle on the next row. It ends at the
/// cell one past the last byte, or once it has left the zoom rectangle at
/// the bottom.
pub fn covered_cells<M: CellMap + ?Sized>(
    insn: &Insn,
    base: Address,
    zoom: ZoomRect,
    cell_map: &M,
) -> Vec<(usize, usize)> {
    let mut cells = Vec::new();
    if zoom.width() == 0 {
        return cells;
    }

    let start = insn.addr.saturating_sub(base);
    let (mut x, mut y) = cell_map.cell(start);
    let (x_end, y_end) = cell_map.cell(start + insn.size as Address);

    while (x, y) != (x_end, y_end) && y <= zoom.y1 && y <= y_end {
        if zoom.contains(x, y) {
            cells.push((x, y));
        }

        x += 1;
        if x >= zoom.x1 {
            x = zoom.x0;
            y += 1;
        }
    }

    cells
}

/// Clear `surface` and paint one box per covered cell of every instruction,
/// colored by opcode classification.
pub fn paint_overlay<S, M>(
    insns: &[Insn],
    zoom: ZoomRect,
    base: Address,
    classifier: &Classifier,
    cell_map: &M,
    surface: &mut S,
) where
    S: Surface + ?Sized,
    M: CellMap + ?Sized,
{
    let (w, h) = (surface.width(), surface.height());
    surface.draw_box(0, 0, w, h, Rgba::TRANSPARENT);

    let Some(geometry) = OverlayGeometry::new(zoom, w, h) else {
        log::debug!("empty zoom rectangle {:?}, overlay left clear", zoom);
        return;
    };

    let mut painted = 0;
    for insn in insns {
        let color = classifier.color_for(insn, Role::Opcode);
        for (x, y) in covered_cells(insn, base, zoom, cell_map) {
            let (px, py) = geometry.to_pixel(x, y);
            surface.draw_box(px, py, geometry.cell_w, geometry.cell_h, color);
            painted += 1;
        }
    }

    log::debug!(
        "overlay: {} cells for {} instructions (scale {:.2}x{:.2})",
        painted,
        insns.len(),
        geometry.scale_x,
        geometry.scale_y
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;
    use crate::classify::ColorPolicy;

    fn insn(addr: Address, size: usize) -> Insn {
        Insn::new(addr, &vec![0x90; size], "nop", "")
    }

    #[test]
    fn test_geometry_scale() {
        let geometry = OverlayGeometry::new(ZoomRect::new(0, 0, 16, 16), 160, 160).unwrap();

        assert_eq!(geometry.scale_x, 10.0);
        assert_eq!(geometry.scale_y, 10.0);
        assert_eq!((geometry.cell_w, geometry.cell_h), (10, 10));
        assert_eq!(geometry.to_pixel(3, 2), (30, 20));
    }

    #[test]
    fn test_fractional_scale_rounds_cell_up() {
        let geometry = OverlayGeometry::new(ZoomRect::new(0, 0, 16, 3), 100, 100).unwrap();

        assert_eq!((geometry.cell_w, geometry.cell_h), (7, 34));
        assert!(OverlayGeometry::new(ZoomRect::new(4, 0, 4, 8), 100, 100).is_none());
    }

    #[test]
    fn test_contiguous_cells_on_one_row() {
        let cells = covered_cells(&insn(0, 4), 0, ZoomRect::new(0, 0, 16, 16), &RowMajor::new(16));

        assert_eq!(cells, vec![(0, 0), (1, 0), (2, 0), (3, 0)]);
    }

    #[test]
    fn test_cells_wrap_to_next_row() {
        let cells = covered_cells(
            &insn(0x100e, 4),
            0x1000,
            ZoomRect::new(0, 0, 16, 16),
            &RowMajor::new(16),
        );

        assert_eq!(cells, vec![(14, 0), (15, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn test_cells_outside_zoom_are_skipped() {
        // bytes 0x42..0x46 of a 16 wide view sit at (2..6, 4)
        let cells = covered_cells(&insn(0x42, 4), 0, ZoomRect::new(4, 4, 8, 8), &RowMajor::new(16));

        assert_eq!(cells, vec![(4, 4), (5, 4)]);
    }

    #[test]
    fn test_walk_stops_below_zoom() {
        let cells = covered_cells(&insn(0, 4096), 0, ZoomRect::new(0, 0, 16, 2), &RowMajor::new(16));

        assert_eq!(cells.len(), 32);
        assert_eq!(cells.last(), Some(&(15, 1)));
    }

    #[test]
    fn test_paint_overlay_boxes() {
        let classifier = Classifier::new(ColorPolicy::Simple);
        let mut canvas = Canvas::new(160, 160);
        canvas.draw_box(0, 0, 160, 160, Rgba::WHITE);

        paint_overlay(
            &[insn(0, 4)],
            ZoomRect::new(0, 0, 16, 16),
            0,
            &classifier,
            &RowMajor::new(16),
            &mut canvas,
        );

        let color = classifier.color_for(&insn(0, 4), Role::Opcode);
        assert_eq!(canvas.count_not(Rgba::TRANSPARENT), 4 * 10 * 10);
        assert_eq!(canvas.pixel(0, 0), Some(color));
        assert_eq!(canvas.pixel(39, 9), Some(color));
        assert_eq!(canvas.pixel(40, 0), Some(Rgba::TRANSPARENT));
        assert_eq!(canvas.pixel(0, 10), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn test_paint_overlay_group_colors() {
        let classifier = Classifier::new(ColorPolicy::Group);
        let mut canvas = Canvas::new(32, 32);
        let jump = insn(0, 2).with_groups(&[1]);
        let ret = insn(2, 1).with_groups(&[3]);

        paint_overlay(
            &[jump.clone(), ret.clone()],
            ZoomRect::new(0, 0, 4, 4),
            0,
            &classifier,
            &RowMajor::new(4),
            &mut canvas,
        );

        assert_eq!(canvas.pixel(0, 0), Some(classifier.color_for(&jump, Role::Opcode)));
        assert_eq!(canvas.pixel(15, 7), Some(classifier.color_for(&jump, Role::Opcode)));
        assert_eq!(canvas.pixel(16, 0), Some(classifier.color_for(&ret, Role::Opcode)));
        assert_eq!(canvas.pixel(24, 0), Some(Rgba::TRANSPARENT));
    }

    #[test]
    fn test_row_major_zero_width() {
        assert_eq!(RowMajor::new(0).cell(5), (0, 5));
    }
}
