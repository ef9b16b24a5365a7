//! 3x3 投影变换（叠加帧坐标 → 底图坐标）。
//!
//! 行主序存储，`h[8]` 归一化为 1。四点求解与内点最小二乘都化为 8 元线性方程组，
//! 用带部分主元的高斯消元求解。

use imageproc::geometric_transformations::Projection;

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Homography {
    m: [f64; 9],
}

impl Homography {
    #[cfg(test)]
    pub(crate) fn identity() -> Self {
        Self {
            m: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        }
    }

    /// 轴向缩放：点 `(x, y)` → `(sx·x, sy·y)`。
    pub(crate) fn scale(sx: f64, sy: f64) -> Self {
        Self {
            m: [sx, 0.0, 0.0, 0.0, sy, 0.0, 0.0, 0.0, 1.0],
        }
    }

    #[cfg(test)]
    pub(crate) fn translation(tx: f64, ty: f64) -> Self {
        Self {
            m: [1.0, 0.0, tx, 0.0, 1.0, ty, 0.0, 0.0, 1.0],
        }
    }

    /// 先应用 `rhs` 再应用 `self`。
    pub(crate) fn then_after(&self, rhs: &Homography) -> Self {
        let a = &self.m;
        let b = &rhs.m;
        let mut m = [0.0; 9];
        for row in 0..3 {
            for col in 0..3 {
                m[row * 3 + col] = (0..3).map(|k| a[row * 3 + k] * b[k * 3 + col]).sum();
            }
        }
        Self { m }.normalized()
    }

    fn normalized(self) -> Self {
        let w = self.m[8];
        if w.abs() < 1e-12 {
            return self;
        }
        let mut m = self.m;
        for v in &mut m {
            *v /= w;
        }
        Self { m }
    }

    pub(crate) fn apply(&self, (x, y): (f64, f64)) -> Option<(f64, f64)> {
        let m = &self.m;
        let w = m[6] * x + m[7] * y + m[8];
        if w.abs() < 1e-12 {
            return None;
        }
        Some((
            (m[0] * x + m[1] * y + m[2]) / w,
            (m[3] * x + m[4] * y + m[5]) / w,
        ))
    }

    /// 点对重投影误差的平方。
    pub(crate) fn reprojection_error_sq(&self, src: (f64, f64), dst: (f64, f64)) -> f64 {
        match self.apply(src) {
            Some((x, y)) => (x - dst.0).powi(2) + (y - dst.1).powi(2),
            None => f64::INFINITY,
        }
    }

    /// 四点精确解。
    pub(crate) fn from_four_points(src: &[(f64, f64); 4], dst: &[(f64, f64); 4]) -> Option<Self> {
        let pairs: Vec<_> = src.iter().copied().zip(dst.iter().copied()).collect();
        Self::least_squares(&pairs)
    }

    /// 多点最小二乘解（法方程，先做 Hartley 归一化）。
    pub(crate) fn least_squares(pairs: &[((f64, f64), (f64, f64))]) -> Option<Self> {
        if pairs.len() < 4 {
            return None;
        }

        let src_norm = Normalizer::fit(pairs.iter().map(|p| p.0))?;
        let dst_norm = Normalizer::fit(pairs.iter().map(|p| p.1))?;

        let mut normal = [[0.0f64; 9]; 8];
        for &(src, dst) in pairs {
            let (r0, r1) = dlt_rows(src_norm.apply(src), dst_norm.apply(dst));
            for row in [r0, r1] {
                for i in 0..8 {
                    for j in 0..8 {
                        normal[i][j] += row[i] * row[j];
                    }
                    normal[i][8] += row[i] * row[8];
                }
            }
        }

        let normalized = solve_8x8(normal).and_then(Self::from_solution)?;
        let h = dst_norm
            .inverse()
            .then_after(&normalized)
            .then_after(&src_norm.forward());
        h.m.iter().all(|v| v.is_finite()).then_some(h)
    }

    fn from_solution(h: [f64; 8]) -> Option<Self> {
        if h.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let m = [h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0];
        let det = m[0] * (m[4] * m[8] - m[5] * m[7]) - m[1] * (m[3] * m[8] - m[5] * m[6])
            + m[2] * (m[3] * m[7] - m[4] * m[6]);
        if det.abs() < 1e-9 {
            return None;
        }
        Some(Self { m })
    }

    /// 转为 imageproc 投影，供 `warp_into` 使用。
    pub(crate) fn to_projection(&self) -> Option<Projection> {
        let mut m = [0.0f32; 9];
        for (dst, src) in m.iter_mut().zip(self.m.iter()) {
            *dst = *src as f32;
        }
        Projection::from_matrix(m)
    }
}

/// 平移到质心并缩放到平均距离 √2。
struct Normalizer {
    cx: f64,
    cy: f64,
    scale: f64,
}

impl Normalizer {
    fn fit(points: impl Iterator<Item = (f64, f64)> + Clone) -> Option<Self> {
        let n = points.clone().count() as f64;
        let (sx, sy) = points.clone().fold((0.0, 0.0), |acc, p| (acc.0 + p.0, acc.1 + p.1));
        let (cx, cy) = (sx / n, sy / n);
        let mean_dist = points
            .map(|(x, y)| ((x - cx).powi(2) + (y - cy).powi(2)).sqrt())
            .sum::<f64>()
            / n;
        if mean_dist < 1e-9 {
            return None;
        }
        Some(Self {
            cx,
            cy,
            scale: std::f64::consts::SQRT_2 / mean_dist,
        })
    }

    fn apply(&self, (x, y): (f64, f64)) -> (f64, f64) {
        ((x - self.cx) * self.scale, (y - self.cy) * self.scale)
    }

    fn forward(&self) -> Homography {
        let s = self.scale;
        Homography {
            m: [s, 0.0, -s * self.cx, 0.0, s, -s * self.cy, 0.0, 0.0, 1.0],
        }
    }

    fn inverse(&self) -> Homography {
        let s = 1.0 / self.scale;
        Homography {
            m: [s, 0.0, self.cx, 0.0, s, self.cy, 0.0, 0.0, 1.0],
        }
    }
}

/// 对应 `x' = (h0 x + h1 y + h2) / (h6 x + h7 y + 1)` 的两行增广方程。
fn dlt_rows((x, y): (f64, f64), (u, v): (f64, f64)) -> ([f64; 9], [f64; 9]) {
    (
        [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, u],
        [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, v],
    )
}

/// 增广矩阵 `[A | b]` 的高斯消元。
fn solve_8x8(mut a: [[f64; 9]; 8]) -> Option<[f64; 8]> {
    for col in 0..8 {
        let pivot = (col..8).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-10 {
            return None;
        }
        a.swap(col, pivot);

        for row in 0..8 {
            if row == col {
                continue;
            }
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..9 {
                a[row][k] -= factor * a[col][k];
            }
        }
    }

    let mut x = [0.0; 8];
    for i in 0..8 {
        x[i] = a[i][8] / a[i][i];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: (f64, f64), b: (f64, f64)) -> bool {
        (a.0 - b.0).abs() < 1e-6 && (a.1 - b.1).abs() < 1e-6
    }

    #[test]
    fn four_points_recover_translation() {
        let src = [(0.0, 0.0), (100.0, 0.0), (100.0, 80.0), (0.0, 80.0)];
        let dst = src.map(|(x, y)| (x + 7.5, y - 3.0));

        let h = Homography::from_four_points(&src, &dst).expect("solve should succeed");
        assert!(close(h.apply((50.0, 40.0)).expect("finite"), (57.5, 37.0)));
    }

    #[test]
    fn collinear_points_are_degenerate() {
        let src = [(0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (3.0, 3.0)];
        let dst = src;
        assert!(Homography::from_four_points(&src, &dst).is_none());
    }

    #[test]
    fn least_squares_matches_exact_projective_map() {
        let truth = Homography {
            m: [1.02, 0.01, 4.0, -0.015, 0.98, -2.0, 0.0001, 0.00005, 1.0],
        };
        let pairs: Vec<_> = (0..6)
            .flat_map(|i| (0..5).map(move |j| (i as f64 * 37.0, j as f64 * 29.0)))
            .map(|p| (p, truth.apply(p).expect("finite")))
            .collect();

        let h = Homography::least_squares(&pairs).expect("solve should succeed");
        for &(src, dst) in &pairs {
            assert!(h.reprojection_error_sq(src, dst) < 1e-6);
        }
    }

    #[test]
    fn composition_applies_right_then_left() {
        let t = Homography::translation(10.0, 0.0);
        let s = Homography::scale(2.0, 2.0);
        let ts = t.then_after(&s);
        assert!(close(ts.apply((1.0, 1.0)).expect("finite"), (12.0, 2.0)));
        assert_eq!(Homography::identity().then_after(&t), t);
    }
}
