//! SIMD-accelerated dense linear algebra primitives: dot product,
//! matrix-vector multiply (and its transpose), vector add/scale, and
//! rank-1 outer-product accumulation. Each has an `x86_64` SSE2 fast path
//! and a scalar fallback defined with the *same* accumulator grouping, so
//! the two are bit-identical rather than merely numerically close — SSE2
//! `mulps`/`addps` round exactly like scalar `*`/`+` when not fused, so
//! matching operation order is all determinism requires.

#[cfg(target_arch = "x86_64")]
use core::arch::x86_64::*;

/// Dot product using four running accumulators combined in a fixed order
/// at the end, then a sequential scalar tail for `len % 4`.
#[cfg(target_arch = "x86_64")]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let len = a.len();
    let chunks = len / 4;
    unsafe {
        let mut acc = _mm_setzero_ps();
        for i in 0..chunks {
            let base = i * 4;
            let av = _mm_loadu_ps(a.as_ptr().add(base));
            let bv = _mm_loadu_ps(b.as_ptr().add(base));
            acc = _mm_add_ps(acc, _mm_mul_ps(av, bv));
        }
        let mut lanes = [0.0f32; 4];
        _mm_storeu_ps(lanes.as_mut_ptr(), acc);
        let mut total = (lanes[0] + lanes[1]) + (lanes[2] + lanes[3]);
        for i in (chunks * 4)..len {
            total += a[i] * b[i];
        }
        total
    }
}

#[cfg(not(target_arch = "x86_64"))]
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let len = a.len();
    let chunks = len / 4;
    let mut lanes = [0.0f32; 4];
    for i in 0..chunks {
        let base = i * 4;
        for lane in 0..4 {
            lanes[lane] += a[base + lane] * b[base + lane];
        }
    }
    let mut total = (lanes[0] + lanes[1]) + (lanes[2] + lanes[3]);
    for i in (chunks * 4)..len {
        total += a[i] * b[i];
    }
    total
}

/// `out[r] = dot(w[r*cols..(r+1)*cols], x)` for `r` in `0..rows`.
pub fn matvec(out: &mut [f32], w: &[f32], x: &[f32], cols: usize, rows: usize) {
    for r in 0..rows {
        let base = r * cols;
        out[r] = dot(&w[base..base + cols], x);
    }
}

/// `out[c] += sum_r w[r*cols+c] * y[r]` — used to propagate gradients back
/// through a weight matrix (`W^T @ y`), restructured as a scatter-add so
/// the inner loop vectorizes over columns instead of rows.
#[cfg(target_arch = "x86_64")]
pub fn matvec_transpose_accum(out: &mut [f32], w: &[f32], y: &[f32], cols: usize, rows: usize) {
    unsafe {
        let op = out.as_mut_ptr();
        for r in 0..rows {
            let yr = y[r];
            if yr == 0.0 {
                continue;
            }
            let yv = _mm_set1_ps(yr);
            let base = r * cols;
            let chunks = cols / 4;
            for i in 0..chunks {
                let off = i * 4;
                let wv = _mm_loadu_ps(w.as_ptr().add(base + off));
                let ov = _mm_loadu_ps(op.add(off));
                _mm_storeu_ps(op.add(off), _mm_add_ps(ov, _mm_mul_ps(wv, yv)));
            }
            for c in (chunks * 4)..cols {
                out[c] += w[base + c] * yr;
            }
        }
    }
}

#[cfg(not(target_arch = "x86_64"))]
pub fn matvec_transpose_accum(out: &mut [f32], w: &[f32], y: &[f32], cols: usize, rows: usize) {
    for r in 0..rows {
        let yr = y[r];
        if yr == 0.0 {
            continue;
        }
        let base = r * cols;
        for c in 0..cols {
            out[c] += w[base + c] * yr;
        }
    }
}

/// `out_r*cols+c += a[r] * b[c]` for a rank-1 weight-gradient accumulation.
pub fn outer_product_accum(out: &mut [f32], a: &[f32], b: &[f32], rows: usize, cols: usize) {
    for r in 0..rows {
        let ar = a[r];
        let base = r * cols;
        for c in 0..cols {
            out[base + c] += ar * b[c];
        }
    }
}

#[cfg(target_arch = "x86_64")]
pub fn vec_add_inplace(dst: &mut [f32], src: &[f32]) {
    debug_assert_eq!(dst.len(), src.len());
    let len = dst.len();
    let chunks = len / 4;
    unsafe {
        for i in 0..chunks {
            let base = i * 4;
            let dv = _mm_loadu_ps(dst.as_ptr().add(base));
            let sv = _mm_loadu_ps(src.as_ptr().add(base));
            _mm_storeu_ps(dst.as_mut_ptr().add(base), _mm_add_ps(dv, sv));
        }
    }
    for i in (chunks * 4)..len {
        dst[i] += src[i];
    }
}

#[cfg(not(target_arch = "x86_64"))]
pub fn vec_add_inplace(dst: &mut [f32], src: &[f32]) {
    for (d, s) in dst.iter_mut().zip(src.iter()) {
        *d += *s;
    }
}

#[cfg(target_arch = "x86_64")]
pub fn vec_scale(out: &mut [f32], scale: f32) {
    let len = out.len();
    let chunks = len / 4;
    unsafe {
        let sv = _mm_set1_ps(scale);
        for i in 0..chunks {
            let base = i * 4;
            let v = _mm_loadu_ps(out.as_ptr().add(base));
            _mm_storeu_ps(out.as_mut_ptr().add(base), _mm_mul_ps(v, sv));
        }
    }
    for i in (chunks * 4)..len {
        out[i] *= scale;
    }
}

#[cfg(not(target_arch = "x86_64"))]
pub fn vec_scale(out: &mut [f32], scale: f32) {
    for v in out.iter_mut() {
        *v *= scale;
    }
}

/// Scalar-only reference path, independent of target arch, for tests that
/// want to assert bit-identical equality regardless of which path the
/// build actually took.
pub mod reference {
    pub fn dot(a: &[f32], b: &[f32]) -> f32 {
        let len = a.len();
        let chunks = len / 4;
        let mut lanes = [0.0f32; 4];
        for i in 0..chunks {
            let base = i * 4;
            for lane in 0..4 {
                lanes[lane] += a[base + lane] * b[base + lane];
            }
        }
        let mut total = (lanes[0] + lanes[1]) + (lanes[2] + lanes[3]);
        for i in (chunks * 4)..len {
            total += a[i] * b[i];
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dot_matches_reference_bit_identical() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0, -6.5, 0.25, 9.0, 0.1];
        let b = [0.5, -1.0, 2.0, 0.25, 1.0, 2.0, 3.0, -4.0, 1.0];
        assert_eq!(dot(&a, &b), reference::dot(&a, &b));
    }

    #[test]
    fn matvec_matches_manual_rows() {
        let w = [1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0];
        let x = [1.0, 2.0, 3.0, 4.0];
        let mut out = [0.0; 2];
        matvec(&mut out, &w, &x, 4, 2);
        assert_eq!(out[0], 1.0 + 4.0);
        assert_eq!(out[1], 1.0 + 2.0 + 3.0 + 4.0);
    }

    #[test]
    fn matvec_transpose_accum_matches_manual() {
        let w = [1.0, 2.0, 3.0, 4.0]; // 2x2, row-major
        let y = [1.0, 0.5];
        let mut out = [0.0; 2];
        matvec_transpose_accum(&mut out, &w, &y, 2, 2);
        assert_eq!(out[0], 1.0 * 1.0 + 3.0 * 0.5);
        assert_eq!(out[1], 2.0 * 1.0 + 4.0 * 0.5);
    }

    #[test]
    fn outer_product_accum_is_rank_one() {
        let a = [1.0, 2.0];
        let b = [3.0, 4.0];
        let mut out = vec![0.0; 4];
        outer_product_accum(&mut out, &a, &b, 2, 2);
        assert_eq!(out, vec![3.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn vec_add_inplace_matches_manual() {
        let mut dst = [1.0, 2.0, 3.0, 4.0, 5.0];
        let src = [10.0, 20.0, 30.0, 40.0, 50.0];
        vec_add_inplace(&mut dst, &src);
        assert_eq!(dst, [11.0, 22.0, 33.0, 44.0, 55.0]);
    }

    #[test]
    fn vec_scale_matches_manual() {
        let mut v = [1.0, 2.0, 3.0, 4.0, 5.0];
        vec_scale(&mut v, 2.0);
        assert_eq!(v, [2.0, 4.0, 6.0, 8.0, 10.0]);
    }
}
