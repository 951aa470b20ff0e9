//! Bitmap vectorization: contour extraction, path simplification, and SVG
//! assembly.
//!
//! The tracer walks pixel boundaries on the integer lattice keeping filled
//! area on the left, which yields closed contours for every connected
//! region and its holes in one pass. Ambiguous corners, where two filled
//! pixels touch only diagonally, are resolved by a [`TurnPolicy`] in the
//! potrace tradition. Contours are then reduced by collinear-run merging
//! and, for higher optimization levels, Ramer-Douglas-Peucker.
//!
//! Coordinates: pixel `(px, py)` occupies the unit square from lattice
//! point `(px, py)` to `(px+1, py+1)`, y growing downward. All contour
//! points are lattice points.

use crate::options::TurnPolicy;
use image::RgbaImage;
use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;

/// Alpha below this is treated as background in both trace modes.
const ALPHA_CUTOFF: u8 = 128;

/// Most layers a color-mode trace will emit; rarer colors beyond the cap
/// are dropped rather than producing pathological documents.
const MAX_COLOR_LAYERS: usize = 32;

/// A monochrome pixel grid. Out-of-bounds reads are empty, so boundary
/// walks never need edge special-casing.
#[derive(Debug, Clone)]
pub struct Bitmap {
    width: u32,
    height: u32,
    pixels: Vec<bool>,
}

impl Bitmap {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![false; (width as usize) * (height as usize)],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= i64::from(self.width) || y >= i64::from(self.height) {
            return false;
        }
        self.pixels[y as usize * self.width as usize + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, filled: bool) {
        self.pixels[y as usize * self.width as usize + x as usize] = filled;
    }

    /// Number of filled pixels.
    pub fn count_filled(&self) -> usize {
        self.pixels.iter().filter(|&&p| p).count()
    }
}

/// Monochrome bitmap from an RGBA image: a pixel is foreground when its
/// Rec. 601 luminance falls below `threshold` and it is mostly opaque.
pub fn threshold_bitmap(img: &RgbaImage, threshold: u8) -> Bitmap {
    let mut bm = Bitmap::new(img.width(), img.height());
    for (x, y, px) in img.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        if a < ALPHA_CUTOFF {
            continue;
        }
        let luma = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
        if (luma as u8) < threshold {
            bm.set(x, y, true);
        }
    }
    bm
}

// ── Contour walking ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dir {
    Right,
    Down,
    Left,
    Up,
}

impl Dir {
    fn delta(self) -> (i64, i64) {
        match self {
            Dir::Right => (1, 0),
            Dir::Down => (0, 1),
            Dir::Left => (-1, 0),
            Dir::Up => (0, -1),
        }
    }

    /// 90° counterclockwise in screen coordinates (y down).
    fn turn_left(self) -> Dir {
        match self {
            Dir::Right => Dir::Up,
            Dir::Up => Dir::Left,
            Dir::Left => Dir::Down,
            Dir::Down => Dir::Right,
        }
    }

    fn turn_right(self) -> Dir {
        match self {
            Dir::Right => Dir::Down,
            Dir::Down => Dir::Left,
            Dir::Left => Dir::Up,
            Dir::Up => Dir::Right,
        }
    }
}

/// The two pixels flanking the edge from `p` one step in direction `d`:
/// `(left, right)` relative to the direction of travel.
fn edge_pixels(p: (i64, i64), d: Dir) -> ((i64, i64), (i64, i64)) {
    let (x, y) = p;
    match d {
        Dir::Right => ((x, y - 1), (x, y)),
        Dir::Down => ((x, y), (x - 1, y)),
        Dir::Left => ((x - 1, y), (x - 1, y - 1)),
        Dir::Up => ((x - 1, y - 1), (x, y - 1)),
    }
}

/// Local color majority around a lattice point, for the minority/majority
/// turn policies. Examines growing square neighborhoods; ties fall through
/// to the next radius and finally to "filled majority".
fn filled_majority(bm: &Bitmap, p: (i64, i64)) -> bool {
    let (x, y) = p;
    for r in 1..=2i64 {
        let mut balance = 0i32;
        for dy in -r..r {
            for dx in -r..r {
                if bm.get(x + dx, y + dy) {
                    balance += 1;
                } else {
                    balance -= 1;
                }
            }
        }
        if balance > 0 {
            return true;
        }
        if balance < 0 {
            return false;
        }
    }
    true
}

/// Pick the outgoing direction at point `p` given incoming direction `d`.
///
/// The two pixels ahead decide: filled-left/empty-right continues straight,
/// both empty turns left, both filled turns right, and the checkerboard
/// case (empty-left/filled-right) defers to the turn policy. Turning right
/// there connects the filled diagonal into one contour; turning left keeps
/// the two filled pixels in separate contours.
fn next_direction(bm: &Bitmap, p: (i64, i64), d: Dir, policy: TurnPolicy) -> Dir {
    let (left_px, right_px) = edge_pixels(p, d);
    match (bm.get(left_px.0, left_px.1), bm.get(right_px.0, right_px.1)) {
        (true, false) => d,
        (false, false) => d.turn_left(),
        (true, true) => d.turn_right(),
        (false, true) => {
            let connect_filled = match policy {
                TurnPolicy::Black | TurnPolicy::Right => true,
                TurnPolicy::White | TurnPolicy::Left => false,
                TurnPolicy::Minority => !filled_majority(bm, p),
                TurnPolicy::Majority => filled_majority(bm, p),
            };
            if connect_filled {
                d.turn_right()
            } else {
                d.turn_left()
            }
        }
    }
}

/// Extract every closed contour (outlines and holes) of the filled regions.
///
/// Each contour is a closed loop of lattice points with the filled area on
/// its left; holes come out with the opposite orientation, so rendering
/// with `fill-rule="evenodd"` reproduces the bitmap.
pub fn trace_bitmap(bm: &Bitmap, policy: TurnPolicy) -> Vec<Vec<(i64, i64)>> {
    let mut contours = Vec::new();
    // Every leftward boundary edge originates at a point (px+1, py) where
    // pixel (px, py) is filled and the pixel above it is not, so tracking
    // the origins of traversed Left edges is enough to deduplicate starts.
    let mut seen_left_edges: HashSet<(i64, i64)> = HashSet::new();

    for py in 0..i64::from(bm.height()) {
        for px in 0..i64::from(bm.width()) {
            if !bm.get(px, py) || bm.get(px, py - 1) {
                continue;
            }
            let start = (px + 1, py);
            if seen_left_edges.contains(&start) {
                continue;
            }

            let mut contour = Vec::new();
            let mut p = start;
            let mut d = Dir::Left;
            loop {
                contour.push(p);
                if d == Dir::Left {
                    seen_left_edges.insert(p);
                }
                let (dx, dy) = d.delta();
                p = (p.0 + dx, p.1 + dy);
                d = next_direction(bm, p, d, policy);
                if p == start && d == Dir::Left {
                    break;
                }
            }
            contours.push(contour);
        }
    }
    contours
}

// ── Simplification ───────────────────────────────────────────────────────

/// Perpendicular distance from `p` to the segment `a`-`b`.
fn perpendicular_distance(p: (f64, f64), a: (f64, f64), b: (f64, f64)) -> f64 {
    let (ax, ay) = a;
    let (bx, by) = b;
    let (px, py) = p;
    let dx = bx - ax;
    let dy = by - ay;
    let len_sq = dx * dx + dy * dy;
    if len_sq == 0.0 {
        return ((px - ax).powi(2) + (py - ay).powi(2)).sqrt();
    }
    (dy * px - dx * py + bx * ay - by * ax).abs() / len_sq.sqrt()
}

fn douglas_peucker(points: &[(f64, f64)], tolerance: f64, out: &mut Vec<(f64, f64)>) {
    if points.len() < 3 {
        out.extend_from_slice(points);
        return;
    }
    let first = points[0];
    let last = points[points.len() - 1];
    let mut max_dist = 0.0;
    let mut max_idx = 0;
    for (i, &p) in points.iter().enumerate().skip(1).take(points.len() - 2) {
        let dist = perpendicular_distance(p, first, last);
        if dist > max_dist {
            max_dist = dist;
            max_idx = i;
        }
    }
    if max_dist > tolerance {
        douglas_peucker(&points[..=max_idx], tolerance, out);
        out.pop();
        douglas_peucker(&points[max_idx..], tolerance, out);
    } else {
        out.push(first);
        out.push(last);
    }
}

/// Reduce a closed contour.
///
/// Collinear runs always merge (lattice walks are mostly unit steps along
/// one axis). Optimization levels above 1 additionally apply
/// Douglas-Peucker with tolerance `(optimization - 1) * 0.2`, anchored at
/// the two mutually farthest-ish points so the closed shape cannot
/// collapse to a line.
pub fn simplify_contour(points: &[(i64, i64)], optimization: u8) -> Vec<(f64, f64)> {
    if points.is_empty() {
        return Vec::new();
    }

    // Collinear merge over the closed loop.
    let n = points.len();
    let mut merged: Vec<(f64, f64)> = Vec::with_capacity(n);
    for i in 0..n {
        let prev = points[(i + n - 1) % n];
        let cur = points[i];
        let next = points[(i + 1) % n];
        let in_dir = (cur.0 - prev.0, cur.1 - prev.1);
        let out_dir = (next.0 - cur.0, next.1 - cur.1);
        // Cross product of unit lattice steps; zero means collinear.
        if in_dir.0 * out_dir.1 - in_dir.1 * out_dir.0 != 0 {
            merged.push((cur.0 as f64, cur.1 as f64));
        }
    }
    if merged.len() < 3 {
        return merged;
    }

    let tolerance = f64::from(optimization.saturating_sub(1)) * 0.2;
    if tolerance <= 0.0 {
        return merged;
    }

    // Split the loop at the vertex farthest from the first point and
    // simplify the two halves independently.
    let anchor = merged[0];
    let far_idx = merged
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            let da = (a.0 - anchor.0).powi(2) + (a.1 - anchor.1).powi(2);
            let db = (b.0 - anchor.0).powi(2) + (b.1 - anchor.1).powi(2);
            da.total_cmp(&db)
        })
        .map(|(i, _)| i)
        .unwrap_or(0);
    if far_idx == 0 {
        return merged;
    }

    let mut first_half = Vec::new();
    douglas_peucker(&merged[..=far_idx], tolerance, &mut first_half);
    let mut second: Vec<(f64, f64)> = merged[far_idx..].to_vec();
    second.push(merged[0]);
    let mut second_half = Vec::new();
    douglas_peucker(&second, tolerance, &mut second_half);

    // Re-join, dropping the duplicated split vertex and closing point.
    first_half.pop();
    second_half.pop();
    first_half.extend(second_half);
    first_half
}

// ── SVG assembly ─────────────────────────────────────────────────────────

/// One fill layer of a traced SVG: a color and the combined path data of
/// every contour in that color.
#[derive(Debug, Clone)]
pub struct TraceLayer {
    pub fill: String,
    pub d: String,
}

fn push_coord(out: &mut String, v: f64) {
    if v.fract() == 0.0 {
        let _ = write!(out, "{}", v as i64);
    } else {
        let _ = write!(out, "{v:.2}");
    }
}

/// `M … L … Z` path data for one closed contour.
pub fn path_data(points: &[(f64, f64)]) -> String {
    let mut d = String::new();
    for (i, &(x, y)) in points.iter().enumerate() {
        d.push(if i == 0 { 'M' } else { 'L' });
        push_coord(&mut d, x);
        d.push(' ');
        push_coord(&mut d, y);
        if i + 1 < points.len() {
            d.push(' ');
        }
    }
    d.push('Z');
    d
}

/// Trace a bitmap into combined path data, or `None` if it has no filled
/// pixels.
pub fn bitmap_path_data(bm: &Bitmap, policy: TurnPolicy, optimization: u8) -> Option<String> {
    let contours = trace_bitmap(bm, policy);
    let mut parts = Vec::new();
    for contour in &contours {
        let simplified = simplify_contour(contour, optimization);
        if simplified.len() >= 3 {
            parts.push(path_data(&simplified));
        }
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Assemble the final SVG document from fill layers, first layer painted
/// first (bottom).
pub fn svg_document(width: u32, height: u32, layers: &[TraceLayer]) -> String {
    let mut doc = String::new();
    let _ = write!(
        doc,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    );
    for layer in layers {
        let _ = write!(
            doc,
            r#"<path d="{}" fill="{}" fill-rule="evenodd"/>"#,
            layer.d, layer.fill
        );
    }
    doc.push_str("</svg>");
    doc
}

// ── Color quantization ───────────────────────────────────────────────────

fn quantize_channel(v: u8, levels: u8) -> u8 {
    let steps = f32::from(levels - 1);
    let bucket = (f32::from(v) / 255.0 * steps).round();
    (bucket * 255.0 / steps).round() as u8
}

/// Posterize the image to `levels` values per channel and return one
/// bitmap per quantized color, most frequent first, capped at
/// [`MAX_COLOR_LAYERS`]. Mostly-transparent pixels belong to no layer.
pub fn color_layers(img: &RgbaImage, levels: u8) -> Vec<([u8; 3], Bitmap)> {
    let mut counts: HashMap<[u8; 3], usize> = HashMap::new();
    for px in img.pixels() {
        let [r, g, b, a] = px.0;
        if a < ALPHA_CUTOFF {
            continue;
        }
        let key = [
            quantize_channel(r, levels),
            quantize_channel(g, levels),
            quantize_channel(b, levels),
        ];
        *counts.entry(key).or_insert(0) += 1;
    }

    let mut colors: Vec<([u8; 3], usize)> = counts.into_iter().collect();
    // Most frequent first; tie-break on the color so output is stable.
    colors.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    colors.truncate(MAX_COLOR_LAYERS);

    colors
        .into_iter()
        .map(|(color, _)| {
            let mut bm = Bitmap::new(img.width(), img.height());
            for (x, y, px) in img.enumerate_pixels() {
                let [r, g, b, a] = px.0;
                if a < ALPHA_CUTOFF {
                    continue;
                }
                let key = [
                    quantize_channel(r, levels),
                    quantize_channel(g, levels),
                    quantize_channel(b, levels),
                ];
                if key == color {
                    bm.set(x, y, true);
                }
            }
            (color, bm)
        })
        .collect()
}

/// `#rrggbb` for a layer fill attribute.
pub fn hex_color(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}
