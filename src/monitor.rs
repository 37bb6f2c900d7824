//! Monitor-chain geometry: clone elimination, chain ordering, and carving
//! the configured bar span into per-output strips.
//!
//! Everything here is pure arithmetic over output rectangles; the actual
//! windows and pixmaps are materialized by the renderer once the chain is
//! validated.

use std::cmp::Ordering;

use x11rb::protocol::xproto::{Pixmap, Window};

use crate::config::BarConfig;
use crate::error::Error;

/// One physical output rectangle as reported by RandR or Xinerama.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputRect {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub height: u16,
}

impl OutputRect {
    fn contains(&self, other: &OutputRect) -> bool {
        other.x >= self.x
            && i32::from(other.x) + i32::from(other.width)
                <= i32::from(self.x) + i32::from(self.width)
            && other.y >= self.y
            && i32::from(other.y) + i32::from(other.height)
                <= i32::from(self.y) + i32::from(self.height)
    }
}

/// A carved strip of the bar: where one monitor's window goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorGeom {
    pub x: i16,
    pub y: i16,
    pub width: u16,
}

/// One monitor of the chain with its materialized X resources.
#[derive(Debug)]
pub struct Monitor {
    pub x: i16,
    pub y: i16,
    pub width: u16,
    pub window: Window,
    pub pixmap: Pixmap,
}

/// Bar geometry after auto-fit resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedGeometry {
    pub width: i32,
    pub height: u16,
    pub monitors: Vec<MonitorGeom>,
}

/// Drop every rectangle fully contained in another: mirrored or cloned
/// outputs report such rectangles and must not get their own bar.
pub fn discard_clones(rects: &mut Vec<OutputRect>) {
    for i in 0..rects.len() {
        if rects[i].width == 0 {
            continue;
        }
        for j in 0..rects.len() {
            if i != j && rects[j].width != 0 && rects[i].contains(&rects[j]) {
                rects[j].width = 0;
            }
        }
    }
    rects.retain(|r| r.width != 0);
}

/// Order the chain left-to-right, top-to-bottom: a rectangle wholly above
/// another ranks earlier, otherwise ascending x decides. This keeps
/// multi-row monitor layouts in reading order.
pub fn sort_chain(rects: &mut [OutputRect]) {
    rects.sort_by(|a, b| {
        let a_above = i32::from(a.y) + i32::from(a.height) <= i32::from(b.y);
        let b_above = i32::from(b.y) + i32::from(b.height) <= i32::from(a.y);
        match (a_above, b_above) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => a.x.cmp(&b.x),
        }
    });
}

/// Resolve auto-fit geometry against the combined chain bounds, validate
/// it, and carve one strip per output the bar spans.
///
/// Misfit geometry is a hard error: there is no safe way to reflow a
/// panel across unavailable screen space.
pub fn carve_chain(
    rects: &[OutputRect],
    config: &BarConfig,
    max_font_height: i16,
) -> Result<ResolvedGeometry, Error> {
    let total_width: i32 = rects.iter().map(|r| i32::from(r.width)).sum();
    let total_height: i32 = rects
        .iter()
        .map(|r| i32::from(r.y) + i32::from(r.height))
        .max()
        .unwrap_or(0);

    let bx = config.offset_x;
    let by = config.offset_y;
    let mut bw = config.width;
    let mut bh = config.height;

    if bw < 0 {
        bw = total_width - bx;
    }
    if bh < 0 || bh > total_height {
        bh = i32::from(max_font_height) + i32::from(config.underline_thickness) + 2;
    }

    if bx + bw > total_width || by + bh > total_height {
        return Err(Error::GeometryDoesNotFit { width: bw, height: bh, x: bx, y: by });
    }

    let bh = bh as u16;
    let mut monitors = Vec::new();
    let mut left = bx;
    let mut remaining = bw;

    for rect in rects {
        // Outputs entirely above the bar's vertical offset can't host it.
        if i32::from(rect.y) + i32::from(rect.height) < by {
            continue;
        }

        if i32::from(rect.width) > left {
            let width = remaining.min(i32::from(rect.width) - left) as u16;
            let y = if config.topbar {
                by + i32::from(rect.y)
            } else {
                i32::from(rect.height) - i32::from(bh) - by + i32::from(rect.y)
            };
            monitors.push(MonitorGeom {
                x: (i32::from(rect.x) + left) as i16,
                y: y as i16,
                width,
            });

            remaining -= i32::from(rect.width) - left;
            if remaining <= 0 {
                break;
            }
        }

        left = (left - i32::from(rect.width)).max(0);
    }

    Ok(ResolvedGeometry { width: bw, height: bh, monitors })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: i16, y: i16, width: u16, height: u16) -> OutputRect {
        OutputRect { x, y, width, height }
    }

    fn config(width: i32, height: i32, x: i32, y: i32, topbar: bool) -> BarConfig {
        BarConfig { width, height, offset_x: x, offset_y: y, topbar, ..Default::default() }
    }

    #[test]
    fn contained_rect_is_discarded_as_clone() {
        let mut rects = vec![rect(0, 0, 1920, 1080), rect(0, 0, 1280, 720)];
        discard_clones(&mut rects);
        assert_eq!(rects, vec![rect(0, 0, 1920, 1080)]);
    }

    #[test]
    fn identical_rects_keep_exactly_one() {
        let mut rects = vec![rect(0, 0, 1920, 1080), rect(0, 0, 1920, 1080)];
        discard_clones(&mut rects);
        assert_eq!(rects.len(), 1);
    }

    #[test]
    fn disjoint_rects_are_both_retained_in_x_order() {
        let mut rects = vec![rect(1920, 0, 1280, 1024), rect(0, 0, 1920, 1080)];
        discard_clones(&mut rects);
        assert_eq!(rects.len(), 2);
        sort_chain(&mut rects);
        assert_eq!(rects[0].x, 0);
        assert_eq!(rects[1].x, 1920);
    }

    #[test]
    fn stacked_rows_sort_top_row_first() {
        let mut rects = vec![
            rect(0, 1080, 1920, 1080),
            rect(1920, 0, 1920, 1080),
            rect(0, 0, 1920, 1080),
        ];
        sort_chain(&mut rects);
        assert_eq!(rects[0], rect(0, 0, 1920, 1080));
        assert_eq!(rects[1], rect(1920, 0, 1920, 1080));
        assert_eq!(rects[2], rect(0, 1080, 1920, 1080));
    }

    #[test]
    fn auto_width_spans_the_whole_chain() {
        let rects = [rect(0, 0, 1920, 1080), rect(1920, 0, 1280, 1024)];
        let geom = carve_chain(&rects, &config(-1, 20, 0, 0, true), 14).unwrap();
        assert_eq!(geom.width, 3200);
        assert_eq!(geom.height, 20);
        assert_eq!(
            geom.monitors,
            vec![
                MonitorGeom { x: 0, y: 0, width: 1920 },
                MonitorGeom { x: 1920, y: 0, width: 1280 },
            ]
        );
    }

    #[test]
    fn auto_height_derives_from_font_and_underline() {
        let rects = [rect(0, 0, 1920, 1080)];
        let cfg = BarConfig { underline_thickness: 2, ..config(-1, -1, 0, 0, true) };
        let geom = carve_chain(&rects, &cfg, 14).unwrap();
        assert_eq!(geom.height, 18);
    }

    #[test]
    fn bottom_placement_computes_y_from_output_height() {
        let rects = [rect(0, 0, 1920, 1080)];
        let geom = carve_chain(&rects, &config(-1, 20, 0, 0, false), 14).unwrap();
        assert_eq!(geom.monitors[0].y, 1060);
    }

    #[test]
    fn oversized_geometry_is_fatal() {
        let rects = [rect(0, 0, 1920, 1080)];
        let err = carve_chain(&rects, &config(2000, 20, 0, 0, true), 14).unwrap_err();
        assert!(matches!(err, Error::GeometryDoesNotFit { .. }));

        let err = carve_chain(&rects, &config(-1, 20, 0, 1081, true), 14).unwrap_err();
        assert!(matches!(err, Error::GeometryDoesNotFit { .. }));
    }

    #[test]
    fn x_offset_consumes_leading_outputs() {
        let rects = [rect(0, 0, 1920, 1080), rect(1920, 0, 1280, 1024)];
        // Offset past the first output: the bar lives on the second alone.
        let geom = carve_chain(&rects, &config(1000, 20, 1920, 0, true), 14).unwrap();
        assert_eq!(geom.monitors, vec![MonitorGeom { x: 1920, y: 0, width: 1000 }]);
    }
}
