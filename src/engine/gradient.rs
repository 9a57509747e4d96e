// Procedural gradients: paint stops rendered into a small SVG document.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::{SyncError, SyncResult};
use crate::manifest::document::{ColorStop, Paint, PaintType, Vector2};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientKind {
    Linear,
    Radial,
    Diamond,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GradientSpec {
    pub kind: GradientKind,
    /// Normalized handle positions; at least two.
    pub handles: Vec<Vector2>,
    pub stops: Vec<ColorStop>,
}

impl GradientSpec {
    pub fn from_paint(paint: &Paint) -> SyncResult<Self> {
        let kind = match paint.kind {
            PaintType::GradientLinear => GradientKind::Linear,
            PaintType::GradientRadial => GradientKind::Radial,
            PaintType::GradientDiamond => GradientKind::Diamond,
            other => {
                return Err(SyncError::UnsupportedAssetKind(format!(
                    "{:?} paint cannot be rendered as a gradient",
                    other
                )))
            }
        };
        if paint.gradient_handle_positions.len() < 2 {
            return Err(SyncError::UnsupportedAssetKind(format!(
                "gradient needs 2 handle positions, got {}",
                paint.gradient_handle_positions.len()
            )));
        }
        Ok(Self {
            kind,
            handles: paint.gradient_handle_positions.clone(),
            stops: paint.gradient_stops.clone(),
        })
    }
}

const INDENT: &str = "    ";

/// Fixed two-decimal formatting; negative zero prints as zero.
fn f2(v: f64) -> String {
    let s = format!("{:.2}", v);
    if s == "-0.00" {
        "0.00".to_string()
    } else {
        s
    }
}

fn channel(v: f64) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0) as u8
}

fn element(out: &mut String, depth: usize, name: &str, attrs: &[(String, String)], self_closing: bool) {
    let pad = INDENT.repeat(depth);
    let _ = write!(out, "{}<{}", pad, name);
    for (key, value) in attrs {
        let _ = write!(out, "\n{}{}{}=\"{}\"", pad, INDENT, key, value);
    }
    out.push_str(if self_closing { " />\n" } else { ">\n" });
}

fn close(out: &mut String, depth: usize, name: &str) {
    let _ = writeln!(out, "{}</{}>", INDENT.repeat(depth), name);
}

/// Render the gradient as an SVG with one definition and a 100x100 rect
/// filled by it. Identical input always yields identical bytes.
pub fn render_svg(spec: &GradientSpec) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
    element(
        &mut out,
        0,
        "svg",
        &[("xmlns".into(), "http://www.w3.org/2000/svg".into())],
        false,
    );
    element(&mut out, 1, "defs", &[], false);

    let mut attrs = vec![("id".to_string(), "gradient".to_string())];
    let tag = match spec.kind {
        GradientKind::Linear => {
            for (i, handle) in spec.handles.iter().take(3).enumerate() {
                attrs.push((format!("x{}", i + 1), f2(handle.x)));
                attrs.push((format!("y{}", i + 1), f2(handle.y)));
            }
            "linearGradient"
        }
        GradientKind::Radial | GradientKind::Diamond => {
            let center = spec.handles[0];
            let edge = spec.handles[1];
            let radius = ((edge.x - center.x).powi(2) + (edge.y - center.y).powi(2)).sqrt();
            attrs.push(("fx".into(), f2(center.x)));
            attrs.push(("fy".into(), f2(center.y)));
            attrs.push(("cx".into(), f2(center.x)));
            attrs.push(("cy".into(), f2(center.y)));
            attrs.push(("r".into(), f2(radius)));
            "radialGradient"
        }
    };
    element(&mut out, 2, tag, &attrs, false);

    for stop in &spec.stops {
        let c = stop.color;
        let style = format!(
            "stop-color:rgb({},{},{});stop-opacity:{}",
            channel(c.r),
            channel(c.g),
            channel(c.b),
            f2(c.a)
        );
        element(
            &mut out,
            3,
            "stop",
            &[("offset".into(), f2(stop.position)), ("style".into(), style)],
            true,
        );
    }

    close(&mut out, 2, tag);
    close(&mut out, 1, "defs");
    element(
        &mut out,
        1,
        "rect",
        &[
            ("width".into(), "100".into()),
            ("height".into(), "100".into()),
            ("fill".into(), "url(#gradient)".into()),
        ],
        true,
    );
    close(&mut out, 0, "svg");
    out
}

/// Write the rendered gradient unless the file already holds the same bytes.
/// Returns the number of bytes written (0 when unchanged).
pub fn write_gradient(spec: &GradientSpec, path: &Path) -> SyncResult<u64> {
    let svg = render_svg(spec);
    if let Ok(existing) = std::fs::read(path) {
        if existing == svg.as_bytes() {
            return Ok(0);
        }
    }
    super::storage::write_atomic(path, svg.as_bytes())?;
    Ok(svg.len() as u64)
}
