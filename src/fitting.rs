use crate::error::{Result, TimingError};

#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct QuadraticFitResult {
    pub peak_x: f64, // vertex of y = ax^2 + bx + c
    pub peak_y: f64,
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

/// Fits y = ax^2 + bx + c to the points by least squares and returns the vertex.
/// Needs at least 3 points and a concave (a < 0) solution.
pub fn fit_quadratic_least_squares(
    x_coords: &[f64],
    y_values: &[f64],
) -> Result<QuadraticFitResult> {
    let n = x_coords.len();
    let epsilon = 1e-12;

    if n < 3 || n != y_values.len() {
        return Err(TimingError::Fit(
            "input vectors must be of the same size and contain at least 3 points".to_string(),
        ));
    }

    // Shift x by the central value to keep the normal equations well conditioned.
    let x_center = x_coords[n / 2];
    let x_scale = x_coords
        .iter()
        .map(|&x| (x - x_center).abs())
        .fold(0.0f64, f64::max);
    if x_scale <= 0.0 {
        return Err(TimingError::Fit("x coordinates are all identical".to_string()));
    }

    let s0 = n as f64;
    let mut s1 = 0.0;
    let mut s2 = 0.0;
    let mut s3 = 0.0;
    let mut s4 = 0.0;
    let mut t0 = 0.0;
    let mut t1 = 0.0;
    let mut t2 = 0.0;

    for (&x, &y) in x_coords.iter().zip(y_values.iter()) {
        let x = (x - x_center) / x_scale;
        let x_sq = x * x;
        s1 += x;
        s2 += x_sq;
        s3 += x_sq * x;
        s4 += x_sq * x_sq;
        t0 += y;
        t1 += x * y;
        t2 += x_sq * y;
    }

    // S0*c + S1*b + S2*a = T0
    // S1*c + S2*b + S3*a = T1
    // S2*c + S3*b + S4*a = T2
    let d = s0 * (s2 * s4 - s3 * s3) - s1 * (s1 * s4 - s2 * s3) + s2 * (s1 * s3 - s2 * s2);
    if d.abs() < epsilon {
        return Err(TimingError::Fit(format!(
            "determinant ({d}) is almost zero, the system is singular"
        )));
    }

    let dc_num = t0 * (s2 * s4 - s3 * s3) - s1 * (t1 * s4 - t2 * s3) + s2 * (t1 * s3 - t2 * s2);
    let db_num = s0 * (t1 * s4 - t2 * s3) - t0 * (s1 * s4 - s2 * s3) + s2 * (s1 * t2 - s2 * t1);
    let da_num = s0 * (s2 * t2 - s3 * t1) - s1 * (s1 * t2 - s2 * t1) + t0 * (s1 * s3 - s2 * s2);

    let a_scaled = da_num / d;
    let b_scaled = db_num / d;
    let c_scaled = dc_num / d;

    let y_scale = y_values.iter().map(|y| y.abs()).fold(0.0f64, f64::max).max(1.0);
    if a_scaled.abs() < epsilon * y_scale {
        return Err(TimingError::Fit(
            "coefficient 'a' is almost zero, the quadratic is degenerate".to_string(),
        ));
    }
    if a_scaled > 0.0 {
        return Err(TimingError::Fit(
            "coefficient 'a' is positive, no maximum exists".to_string(),
        ));
    }

    let peak_scaled = -b_scaled / (2.0 * a_scaled);
    let peak_y = c_scaled - b_scaled * b_scaled / (4.0 * a_scaled);

    // back to unscaled coordinates: y = a_s u^2 + b_s u + c_s with u = (x - xc) / s
    let a = a_scaled / (x_scale * x_scale);
    let b = b_scaled / x_scale - 2.0 * a * x_center;
    let c = c_scaled - b_scaled * x_center / x_scale + a * x_center * x_center;

    Ok(QuadraticFitResult {
        peak_x: peak_scaled * x_scale + x_center,
        peak_y,
        a,
        b,
        c,
    })
}
