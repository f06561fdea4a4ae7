//! Correlation-based alignment estimation between two overlap crops.
//!
//! Estimates a Euclidean motion (rotation + uniform scale + 2D translation,
//! held as a 2×3 matrix) mapping template coordinates into the target buffer
//! by Gauss–Newton iteration, tracking the correlation coefficient between
//! the template and the warped target and stopping once its improvement falls
//! below `epsilon`.

use image::RgbaImage;
use nalgebra::{Matrix4, Vector4};

// ── Error type ─────────────────────────────────────────────────────────────

/// Solver failures. All of them are recoverable at the pair level: the caller
/// logs and skips the pair, exactly like a geometry failure.
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationError {
    /// Crops too small to constrain the motion model.
    TooSmall { width: u32, height: u32 },
    /// Normal-equation matrix was singular.
    Singular,
    /// Parameters diverged to non-finite values or correlation never became
    /// meaningful.
    DidNotConverge,
}

impl std::fmt::Display for RegistrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooSmall { width, height } => {
                write!(f, "crops too small for registration: {}x{}", width, height)
            }
            Self::Singular => write!(f, "singular normal equations"),
            Self::DidNotConverge => write!(f, "solver did not converge"),
        }
    }
}

impl std::error::Error for RegistrationError {}

// ── Result types ───────────────────────────────────────────────────────────

/// Estimated 2×3 Euclidean motion matrix `[[a, b, tx], [d, e, ty]]` mapping
/// template pixel coordinates into the target buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionEstimate {
    pub matrix: [[f64; 3]; 2],
    /// Final correlation coefficient between template and warped target.
    pub correlation: f64,
    pub iterations: u32,
}

/// Decomposed motion parameters.
///
/// `angle_deg` is the applied rotation estimate; `cross_angle_deg` is the
/// second angle readable from the matrix, kept as a diagnostic and never
/// applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionDecomposition {
    pub scale_x: f64,
    pub scale_y: f64,
    pub angle_deg: f64,
    pub cross_angle_deg: f64,
    pub tx: f64,
    pub ty: f64,
}

impl MotionEstimate {
    pub fn decompose(&self) -> MotionDecomposition {
        let [[a, b, tx], [d, e, ty]] = self.matrix;
        MotionDecomposition {
            scale_x: a.signum() * (a * a + b * b).sqrt(),
            scale_y: e.signum() * (d * d + e * e).sqrt(),
            angle_deg: (-b).atan2(a).to_degrees(),
            cross_angle_deg: d.atan2(e).to_degrees(),
            tx,
            ty,
        }
    }
}

// ── Solver ─────────────────────────────────────────────────────────────────

const MIN_DIM: u32 = 8;
const MIN_VALID_PIXELS: usize = 32;

/// Estimate the Euclidean motion aligning `target` onto `template`:
/// `template(x) ≈ target(W(x))`.
///
/// Transparent template pixels (masked out by the intersection extractor) do
/// not constrain the solution.
pub fn estimate_motion(
    template: &RgbaImage,
    target: &RgbaImage,
    max_iterations: u32,
    epsilon: f64,
) -> Result<MotionEstimate, RegistrationError> {
    let (w, h) = template.dimensions();
    debug_assert_eq!(template.dimensions(), target.dimensions());
    if w < MIN_DIM || h < MIN_DIM {
        return Err(RegistrationError::TooSmall {
            width: w,
            height: h,
        });
    }

    let tmpl = gray_plane(template);
    let tgt = gray_plane(target);
    let (grad_x, grad_y) = gradients(&tgt, w as usize, h as usize);

    // Parameters: [tx, ty, theta, s], warp W(x) = s R(theta) x + t.
    let mut tx = 0.0f64;
    let mut ty = 0.0f64;
    let mut theta = 0.0f64;
    let mut scale = 1.0f64;

    let mut prev_corr = f64::NEG_INFINITY;
    let mut iterations = 0u32;
    let mut corr = f64::NEG_INFINITY;

    for it in 0..max_iterations.max(1) {
        iterations = it + 1;
        let (sin_t, cos_t) = theta.sin_cos();

        let mut hess = Matrix4::<f64>::zeros();
        let mut grad = Vector4::<f64>::zeros();
        let mut n_valid = 0usize;

        // Correlation accumulators over valid pixels.
        let mut sum_a = 0.0;
        let mut sum_b = 0.0;
        let mut sum_aa = 0.0;
        let mut sum_bb = 0.0;
        let mut sum_ab = 0.0;

        for py in 0..h {
            for px in 0..w {
                if template.get_pixel(px, py)[3] == 0 {
                    continue;
                }
                let x = px as f64;
                let y = py as f64;
                let qx = scale * (cos_t * x - sin_t * y) + tx;
                let qy = scale * (sin_t * x + cos_t * y) + ty;

                let tv = match bilinear(&tgt, w as usize, h as usize, qx, qy) {
                    Some(v) => v,
                    None => continue,
                };
                let gx = match bilinear(&grad_x, w as usize, h as usize, qx, qy) {
                    Some(v) => v,
                    None => continue,
                };
                let gy = match bilinear(&grad_y, w as usize, h as usize, qx, qy) {
                    Some(v) => v,
                    None => continue,
                };

                let a = tmpl[(py as usize) * (w as usize) + px as usize];
                let e = a - tv;

                // dW/dp columns: tx, ty, theta, s.
                let dth_x = scale * (-sin_t * x - cos_t * y);
                let dth_y = scale * (cos_t * x - sin_t * y);
                let ds_x = cos_t * x - sin_t * y;
                let ds_y = sin_t * x + cos_t * y;
                let j = Vector4::new(
                    gx,
                    gy,
                    gx * dth_x + gy * dth_y,
                    gx * ds_x + gy * ds_y,
                );

                hess += j * j.transpose();
                grad += j * e;
                n_valid += 1;

                sum_a += a;
                sum_b += tv;
                sum_aa += a * a;
                sum_bb += tv * tv;
                sum_ab += a * tv;
            }
        }

        if n_valid < MIN_VALID_PIXELS {
            return Err(RegistrationError::DidNotConverge);
        }

        let n = n_valid as f64;
        let cov = sum_ab / n - (sum_a / n) * (sum_b / n);
        let var_a = sum_aa / n - (sum_a / n) * (sum_a / n);
        let var_b = sum_bb / n - (sum_b / n) * (sum_b / n);
        corr = if var_a > 1e-12 && var_b > 1e-12 {
            cov / (var_a.sqrt() * var_b.sqrt())
        } else {
            return Err(RegistrationError::DidNotConverge);
        };

        if corr - prev_corr < epsilon && it > 0 {
            break;
        }
        prev_corr = corr;

        // Light damping keeps near-degenerate windows solvable.
        hess += Matrix4::identity() * 1e-9;
        let step = match hess.lu().solve(&grad) {
            Some(s) => s,
            None => return Err(RegistrationError::Singular),
        };
        if step.iter().any(|v| !v.is_finite()) {
            return Err(RegistrationError::DidNotConverge);
        }

        tx += step[0];
        ty += step[1];
        theta += step[2];
        scale += step[3];

        if !tx.is_finite() || !ty.is_finite() || !theta.is_finite() || !scale.is_finite() {
            return Err(RegistrationError::DidNotConverge);
        }
        if step.norm() < 1e-7 {
            break;
        }
    }

    if !corr.is_finite() {
        return Err(RegistrationError::DidNotConverge);
    }

    let (sin_t, cos_t) = theta.sin_cos();
    Ok(MotionEstimate {
        matrix: [
            [scale * cos_t, -scale * sin_t, tx],
            [scale * sin_t, scale * cos_t, ty],
        ],
        correlation: corr,
        iterations,
    })
}

// ── Pixel plane helpers ────────────────────────────────────────────────────

/// Rec.601 luma plane, row-major f64.
fn gray_plane(img: &RgbaImage) -> Vec<f64> {
    img.pixels()
        .map(|p| 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64)
        .collect()
}

/// Central-difference gradients of a plane.
fn gradients(plane: &[f64], w: usize, h: usize) -> (Vec<f64>, Vec<f64>) {
    let mut gx = vec![0.0; w * h];
    let mut gy = vec![0.0; w * h];
    for y in 0..h {
        for x in 0..w {
            let xm = x.saturating_sub(1);
            let xp = (x + 1).min(w - 1);
            let ym = y.saturating_sub(1);
            let yp = (y + 1).min(h - 1);
            gx[y * w + x] = (plane[y * w + xp] - plane[y * w + xm]) / (xp - xm).max(1) as f64;
            gy[y * w + x] = (plane[yp * w + x] - plane[ym * w + x]) / (yp - ym).max(1) as f64;
        }
    }
    (gx, gy)
}

/// Bilinear sample of a row-major plane, `None` outside.
#[inline]
fn bilinear(plane: &[f64], w: usize, h: usize, x: f64, y: f64) -> Option<f64> {
    if x < 0.0 || y < 0.0 {
        return None;
    }
    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    if x0 + 1 >= w || y0 + 1 >= h {
        return None;
    }
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;
    let p00 = plane[y0 * w + x0];
    let p10 = plane[y0 * w + x0 + 1];
    let p01 = plane[(y0 + 1) * w + x0];
    let p11 = plane[(y0 + 1) * w + x0 + 1];
    Some((1.0 - fx) * (1.0 - fy) * p00 + fx * (1.0 - fy) * p10 + (1.0 - fx) * fy * p01 + fx * fy * p11)
}
