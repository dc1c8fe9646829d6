/*
GPL-3.0 License with Dioptas Attribution

Copyright (c) 2025 Ameyanagi

Based on or developed using Distribution: Dioptas
Copyright (c) 2014-2024 Clemens Prescher and the Dioptas contributors.
All rights reserved.
*/

//! Pixel sets covered by geometric shapes
//!
//! Coordinates are fractional (row, col) pixel positions where integer values
//! address pixel centers. A pixel belongs to a shape when its center does.

/// Pixels whose centers fall in the rectangle spanned by two corners
pub fn rectangle(shape: (usize, usize), corner: (f64, f64), opposite: (f64, f64)) -> Vec<(usize, usize)> {
    let (r0, r1) = (corner.0.min(opposite.0), corner.0.max(opposite.0));
    let (c0, c1) = (corner.1.min(opposite.1), corner.1.max(opposite.1));
    let rows = index_range(r0, r1, shape.0);
    let cols = index_range(c0, c1, shape.1);
    let mut pixels = Vec::with_capacity(rows.len() * cols.len());
    for i in rows {
        for j in cols.clone() {
            pixels.push((i, j));
        }
    }
    pixels
}

/// Pixels inside an ellipse with semi-axes `radii` rotated by `angle` radians
pub fn ellipse(shape: (usize, usize), center: (f64, f64), radii: (f64, f64), angle: f64) -> Vec<(usize, usize)> {
    if radii.0 <= 0.0 || radii.1 <= 0.0 {
        return Vec::new();
    }
    let reach = radii.0.max(radii.1);
    let rows = index_range(center.0 - reach, center.0 + reach, shape.0);
    let cols = index_range(center.1 - reach, center.1 + reach, shape.1);
    let (sin, cos) = angle.sin_cos();
    let mut pixels = Vec::new();
    for i in rows {
        for j in cols.clone() {
            let dr = i as f64 - center.0;
            let dc = j as f64 - center.1;
            let u = dr * cos + dc * sin;
            let v = -dr * sin + dc * cos;
            if (u / radii.0).powi(2) + (v / radii.1).powi(2) <= 1.0 {
                pixels.push((i, j));
            }
        }
    }
    pixels
}

/// Pixels inside a circle
pub fn circle(shape: (usize, usize), center: (f64, f64), radius: f64) -> Vec<(usize, usize)> {
    ellipse(shape, center, (radius, radius), 0.0)
}

/// Pixels inside a polygon, even-odd rule
pub fn polygon(shape: (usize, usize), vertices: &[(f64, f64)]) -> Vec<(usize, usize)> {
    if vertices.len() < 3 {
        return Vec::new();
    }
    let (mut r0, mut r1, mut c0, mut c1) = (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
    for &(r, c) in vertices {
        r0 = r0.min(r);
        r1 = r1.max(r);
        c0 = c0.min(c);
        c1 = c1.max(c);
    }
    let mut pixels = Vec::new();
    for i in index_range(r0, r1, shape.0) {
        for j in index_range(c0, c1, shape.1) {
            if point_in_polygon(i as f64, j as f64, vertices) {
                pixels.push((i, j));
            }
        }
    }
    pixels
}

/// Ray casting along the column axis
pub fn point_in_polygon(row: f64, col: f64, vertices: &[(f64, f64)]) -> bool {
    let mut inside = false;
    let n = vertices.len();
    let mut k = n - 1;
    for m in 0..n {
        let (ri, ci) = vertices[m];
        let (rk, ck) = vertices[k];
        if (ri > row) != (rk > row) {
            let crossing = ci + (row - ri) * (ck - ci) / (rk - ri);
            if col < crossing {
                inside = !inside;
            }
        }
        k = m;
    }
    inside
}

/// Pixel indices in [0, len) whose centers lie in [lo, hi]
fn index_range(lo: f64, hi: f64, len: usize) -> std::ops::Range<usize> {
    if len == 0 || hi < 0.0 || lo > (len - 1) as f64 || lo.is_nan() || hi.is_nan() {
        return 0..0;
    }
    let start = lo.max(0.0).ceil() as usize;
    let end = hi.floor().min((len - 1) as f64) as usize + 1;
    start..end.max(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_includes_corners() {
        let pixels = rectangle((10, 10), (2.0, 3.0), (4.0, 1.0));
        assert_eq!(pixels.len(), 9);
        assert!(pixels.contains(&(2, 1)));
        assert!(pixels.contains(&(4, 3)));
    }

    #[test]
    fn test_rectangle_clipped_to_image() {
        let pixels = rectangle((5, 5), (-3.0, -3.0), (1.0, 10.0));
        assert_eq!(pixels.len(), 10);
    }

    #[test]
    fn test_unbounded_extents_are_clipped() {
        assert_eq!(rectangle((10, 10), (0.0, 0.0), (1e30, 3.0)).len(), 40);
        assert_eq!(rectangle((10, 10), (f64::NEG_INFINITY, 0.0), (f64::INFINITY, 0.0)).len(), 10);
        assert_eq!(circle((5, 5), (2.0, 2.0), f64::INFINITY).len(), 25);
        assert_eq!(polygon((4, 4), &[(-1.0, -1.0), (1e40, -1.0), (-1.0, 1e40)]).len(), 16);
        assert_eq!(index_range(2.5, f64::INFINITY, 6), 3..6);
        assert_eq!(index_range(f64::NEG_INFINITY, 1e300, 4), 0..4);
    }

    #[test]
    fn test_circle_area() {
        let pixels = circle((200, 200), (100.0, 100.0), 50.0);
        let area = std::f64::consts::PI * 2500.0;
        assert!((pixels.len() as f64 - area).abs() / area < 0.01);
    }

    #[test]
    fn test_rotated_ellipse() {
        let pixels = ellipse((50, 50), (25.0, 25.0), (10.0, 2.0), std::f64::consts::FRAC_PI_2);
        assert!(pixels.contains(&(25, 34)));
        assert!(!pixels.contains(&(34, 25)));
    }

    #[test]
    fn test_polygon_triangle() {
        let triangle = [(0.0, 0.0), (0.0, 10.0), (10.0, 0.0)];
        assert!(point_in_polygon(2.0, 2.0, &triangle));
        assert!(!point_in_polygon(8.0, 8.0, &triangle));
        let pixels = polygon((20, 20), &triangle);
        assert!(pixels.contains(&(1, 1)));
        assert!(!pixels.contains(&(9, 9)));
    }
}
