//! Dense inner loops shared by the populations and the learning rule.
//!
//! With the `simd` feature the loops run four lanes at a time through
//! `wide::f64x4`; otherwise they are plain scalar loops.

#[cfg(feature = "simd")]
use wide::f64x4;

/// `Σ a[i]·b[i]`
#[cfg(not(feature = "simd"))]
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(feature = "simd")]
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    let n = a.len().min(b.len());
    let chunks = n / 4;
    let mut acc = f64x4::splat(0.0);
    for c in 0..chunks {
        let i = c * 4;
        let va = f64x4::from([a[i], a[i + 1], a[i + 2], a[i + 3]]);
        let vb = f64x4::from([b[i], b[i + 1], b[i + 2], b[i + 3]]);
        acc += va * vb;
    }
    let mut sum: f64 = acc.to_array().iter().sum();
    for i in chunks * 4..n {
        sum += a[i] * b[i];
    }
    sum
}

/// `y[i] += alpha·x[i]`
#[cfg(not(feature = "simd"))]
#[inline]
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    for (yi, xi) in y.iter_mut().zip(x) {
        *yi += alpha * xi;
    }
}

#[cfg(feature = "simd")]
#[inline]
pub fn axpy(alpha: f64, x: &[f64], y: &mut [f64]) {
    let n = x.len().min(y.len());
    let chunks = n / 4;
    let va = f64x4::splat(alpha);
    for c in 0..chunks {
        let i = c * 4;
        let vx = f64x4::from([x[i], x[i + 1], x[i + 2], x[i + 3]]);
        let vy = f64x4::from([y[i], y[i + 1], y[i + 2], y[i + 3]]);
        y[i..i + 4].copy_from_slice(&(vy + va * vx).to_array());
    }
    for i in chunks * 4..n {
        y[i] += alpha * x[i];
    }
}

/// Euclidean norm.
#[inline]
pub fn norm(v: &[f64]) -> f64 {
    dot(v, v).sqrt()
}
