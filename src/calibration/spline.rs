//! Interpolating cubic spline with not-a-knot end conditions.
//!
//! This is the curve a smoothing-free cubic B-spline fit produces: it passes through
//! every point and the third derivative is continuous across the second and the
//! second-to-last points. Outside the data range the end pieces are extended.

/// Minimum number of points needed for a cubic fit.
pub const MIN_POINTS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct Spline {
    x: Vec<f64>,
    y: Vec<f64>,
    /// Second derivatives at each knot.
    m: Vec<f64>,
}

impl Spline {
    /// Fit a spline to the points. Points need not be sorted, but the `x` values must be
    /// distinct and finite.
    ///
    /// Returns `None` if there are too few points or the points are degenerate.
    #[must_use]
    pub fn fit(x: &[f64], y: &[f64]) -> Option<Self> {
        if x.len() != y.len() || x.len() < MIN_POINTS {
            return None;
        }
        let mut points: Vec<(f64, f64)> = x.iter().copied().zip(y.iter().copied()).collect();
        if points.iter().any(|(a, b)| !a.is_finite() || !b.is_finite()) {
            return None;
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
        if points.windows(2).any(|w| w[0].0 == w[1].0) {
            return None;
        }
        let (x, y): (Vec<f64>, Vec<f64>) = points.into_iter().unzip();
        let m = second_derivatives(&x, &y)?;
        Some(Spline { x, y, m })
    }

    /// Evaluate at `at`, extrapolating with the first or last piece.
    #[must_use]
    pub fn eval(&self, at: f64) -> f64 {
        let n = self.x.len();
        // index of the piece [x[i], x[i+1]] to use
        let i = match self.x.partition_point(|v| *v <= at) {
            0 => 0,
            p if p >= n => n - 2,
            p => p - 1,
        };
        let (x0, x1) = (self.x[i], self.x[i + 1]);
        let (y0, y1) = (self.y[i], self.y[i + 1]);
        let (m0, m1) = (self.m[i], self.m[i + 1]);
        let h = x1 - x0;
        let a = x1 - at;
        let b = at - x0;
        m0 * a.powi(3) / (6. * h)
            + m1 * b.powi(3) / (6. * h)
            + (y0 / h - m0 * h / 6.) * a
            + (y1 / h - m1 * h / 6.) * b
    }
}

/// Solve for the knot second derivatives.
fn second_derivatives(x: &[f64], y: &[f64]) -> Option<Vec<f64>> {
    let n = x.len();
    let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
    let mut a = vec![vec![0f64; n]; n];
    let mut rhs = vec![0f64; n];

    // not-a-knot at x[1]: equal third derivative on both sides
    a[0][0] = h[1];
    a[0][1] = -(h[0] + h[1]);
    a[0][2] = h[0];

    for i in 1..n - 1 {
        a[i][i - 1] = h[i - 1];
        a[i][i] = 2. * (h[i - 1] + h[i]);
        a[i][i + 1] = h[i];
        rhs[i] = 6. * ((y[i + 1] - y[i]) / h[i] - (y[i] - y[i - 1]) / h[i - 1]);
    }

    // not-a-knot at x[n-2]
    a[n - 1][n - 3] = h[n - 2];
    a[n - 1][n - 2] = -(h[n - 3] + h[n - 2]);
    a[n - 1][n - 1] = h[n - 3];

    solve(a, rhs)
}

/// Gaussian elimination with partial pivoting. Calibration tables are small so a dense
/// solve is fine.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&r, &s| a[r][col].abs().total_cmp(&a[s][col].abs()))?;
        if a[pivot][col].abs() < f64::EPSILON {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0. {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut out = vec![0f64; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * out[k]).sum();
        out[row] = (b[row] - tail) / a[row][row];
    }
    if out.iter().all(|v| v.is_finite()) {
        Some(out)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn reproduces_cubic_exactly() {
        // not-a-knot splines are exact for cubics, inside and outside the data range
        let x = [0., 1., 2., 3., 4., 6.];
        let y: Vec<f64> = x.iter().map(|v| v * v * v - 2. * v + 1.).collect();
        let spline = Spline::fit(&x, &y).unwrap();
        for at in [-1., 0., 0.5, 2.5, 3.7, 5., 6., 8.] {
            let expected = at * at * at - 2. * at + 1.;
            let got = spline.eval(at);
            assert!(close(got, expected), "at={at} expected={expected} got={got}");
        }
    }

    #[test]
    fn passes_through_points() {
        let x = [10., 20., 30., 45., 60.];
        let y = [1.5, -3., 2., 7., 7.5];
        let spline = Spline::fit(&x, &y).unwrap();
        for (xi, yi) in x.iter().zip(y) {
            assert!(close(spline.eval(*xi), yi), "x={xi}");
        }
    }

    #[test]
    fn unsorted_input() {
        let x = [3., 0., 2., 1.];
        let y = [3., 0., 2., 1.];
        let spline = Spline::fit(&x, &y).unwrap();
        assert!(close(spline.eval(1.5), 1.5));
    }

    #[test]
    fn degenerate_inputs() {
        assert!(Spline::fit(&[0., 1., 2.], &[0., 1., 2.]).is_none());
        assert!(Spline::fit(&[0., 1., 1., 2.], &[0., 1., 1., 2.]).is_none());
        assert!(Spline::fit(&[0., 1., 2., 3.], &[0., 1., 2.]).is_none());
        assert!(Spline::fit(&[0., 1., f64::NAN, 3.], &[0., 1., 2., 3.]).is_none());
    }
}
