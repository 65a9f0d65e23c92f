//! 点到椭圆的最近点
//!
//! Eberly《Distance from a Point to an Ellipse》二分求根法，f64 计算。

use glam::Vec2;

const MAX_BISECTIONS: usize = 160;

/// 椭圆 (x/rx)² + (y/ry)² = 1 上距离 `point` 最近的点
///
/// 半轴须为正数。
pub fn closest_point_on_ellipse(radii: Vec2, point: Vec2) -> Vec2 {
    debug_assert!(radii.x > 0.0 && radii.y > 0.0);

    let (rx, ry) = (radii.x as f64, radii.y as f64);
    let (px, py) = (point.x as f64, point.y as f64);

    // 统一到 e0 >= e1 的第一象限
    let swapped = rx < ry;
    let (e0, e1, y0, y1) = if swapped {
        (ry, rx, py.abs(), px.abs())
    } else {
        (rx, ry, px.abs(), py.abs())
    };

    let (x0, x1) = closest_in_first_quadrant(e0, e1, y0, y1);
    let (x, y) = if swapped { (x1, x0) } else { (x0, x1) };

    Vec2::new(
        (x as f32).copysign(point.x),
        (y as f32).copysign(point.y),
    )
}

/// 椭圆内部判断（含边界容差）
#[inline]
pub fn is_inside_ellipse(radii: Vec2, point: Vec2, tolerance: f32) -> bool {
    let n = point / radii;
    n.length_squared() <= 1.0 + tolerance
}

fn closest_in_first_quadrant(e0: f64, e1: f64, y0: f64, y1: f64) -> (f64, f64) {
    if y1 > 0.0 {
        if y0 > 0.0 {
            let z0 = y0 / e0;
            let z1 = y1 / e1;
            let g = z0 * z0 + z1 * z1 - 1.0;
            if g != 0.0 {
                let r0 = (e0 / e1) * (e0 / e1);
                let sbar = bisect_root(r0, z0, z1, g);
                (r0 * y0 / (sbar + r0), y1 / (sbar + 1.0))
            } else {
                (y0, y1)
            }
        } else {
            (0.0, e1)
        }
    } else {
        let numer0 = e0 * y0;
        let denom0 = e0 * e0 - e1 * e1;
        if numer0 < denom0 {
            let xde0 = numer0 / denom0;
            (e0 * xde0, e1 * (1.0 - xde0 * xde0).max(0.0).sqrt())
        } else {
            (e0, 0.0)
        }
    }
}

fn bisect_root(r0: f64, z0: f64, z1: f64, g: f64) -> f64 {
    let n0 = r0 * z0;
    let mut s0 = z1 - 1.0;
    let mut s1 = if g < 0.0 { 0.0 } else { n0.hypot(z1) - 1.0 };
    let mut s = 0.0;
    for _ in 0..MAX_BISECTIONS {
        s = 0.5 * (s0 + s1);
        if s == s0 || s == s1 {
            break;
        }
        let ratio0 = n0 / (s + r0);
        let ratio1 = z1 / (s + 1.0);
        let g = ratio0 * ratio0 + ratio1 * ratio1 - 1.0;
        if g > 0.0 {
            s0 = s;
        } else if g < 0.0 {
            s1 = s;
        } else {
            break;
        }
    }
    s
}
