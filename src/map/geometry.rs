use crate::braille::BrailleCanvas;

/// Draw a line using Bresenham's algorithm
pub fn draw_line(canvas: &mut BrailleCanvas, x0: i32, y0: i32, x1: i32, y1: i32) {
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    let (mut x, mut y) = (x0, y0);

    loop {
        canvas.set_pixel_signed(x, y);
        if x == x1 && y == y1 {
            break;
        }

        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Dotted line: every `gap`-th pixel (graticule and satellite grid)
pub fn draw_dotted_line(canvas: &mut BrailleCanvas, x0: i32, y0: i32, x1: i32, y1: i32, gap: i32) {
    let steps = (x1 - x0).abs().max((y1 - y0).abs()).max(1);
    let gap = gap.max(1);
    for i in (0..=steps).step_by(gap as usize) {
        let x = x0 + (x1 - x0) * i / steps;
        let y = y0 + (y1 - y0) * i / steps;
        canvas.set_pixel_signed(x, y);
    }
}

/// Circle outline, used to ring the selected venue
pub fn draw_ring(canvas: &mut BrailleCanvas, cx: i32, cy: i32, radius: i32) {
    let inner = (radius - 1) * (radius - 1);
    let outer = radius * radius;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let d = dx * dx + dy * dy;
            if d <= outer && d > inner {
                canvas.set_pixel_signed(cx + dx, cy + dy);
            }
        }
    }
}

/// Filled circle for place dots
pub fn draw_circle(canvas: &mut BrailleCanvas, cx: i32, cy: i32, radius: i32) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                canvas.set_pixel_signed(cx + dx, cy + dy);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_horizontal_line_fills_top_row() {
        let mut canvas = BrailleCanvas::new(5, 1);
        draw_line(&mut canvas, 0, 0, 9, 0);
        assert_eq!(canvas.text(), "⠉⠉⠉⠉⠉");
    }

    #[test]
    fn test_vertical_line() {
        let mut canvas = BrailleCanvas::new(1, 2);
        draw_line(&mut canvas, 0, 0, 0, 7);
        assert_eq!(canvas.text(), "⡇\n⡇");
    }

    #[test]
    fn test_line_clips_offscreen_part() {
        let mut canvas = BrailleCanvas::new(2, 1);
        draw_line(&mut canvas, -10, 0, 3, 0);
        assert_eq!(canvas.text(), "⠉⠉");
    }

    #[test]
    fn test_dotted_line_skips_pixels() {
        let mut solid = BrailleCanvas::new(10, 1);
        let mut dotted = BrailleCanvas::new(10, 1);
        draw_line(&mut solid, 0, 0, 19, 0);
        draw_dotted_line(&mut dotted, 0, 0, 19, 0, 4);
        assert_eq!(solid.filled_cells(), 10);
        assert_eq!(dotted.filled_cells(), 5);
    }

    #[test]
    fn test_ring_has_hollow_center() {
        let mut canvas = BrailleCanvas::new(8, 4);
        draw_ring(&mut canvas, 8, 8, 4);
        // The cell holding the center only carries the ring dot at (9, 11)
        assert_eq!(canvas.glyph(4, 2), Some('⢀'));
        assert!(canvas.filled_cells() > 4);
    }
}
