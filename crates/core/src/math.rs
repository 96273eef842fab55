use num_traits::{Float as NumFloat, FromPrimitive};
use std::ops::{AddAssign, MulAssign, SubAssign};
use std::time::{Duration, Instant};

pub trait RealNumber:
    NumFloat + FromPrimitive + Send + Sync + AddAssign + SubAssign + MulAssign + 'static
{
}

impl<T> RealNumber for T where
    T: NumFloat + FromPrimitive + Send + Sync + AddAssign + SubAssign + MulAssign + 'static
{
}

#[cfg(not(feature = "f32"))]
pub type Scalar = f64;

#[cfg(feature = "f32")]
pub type Scalar = f32;

/// Converts an `f64` literal into `T`, yielding NaN when the value is not representable.
pub fn constant<T: RealNumber>(value: f64) -> T {
    T::from_f64(value).unwrap_or_else(T::nan)
}

/// Lossy conversion used for diagnostics carried in error payloads.
pub fn to_f64<T: RealNumber>(value: T) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

pub fn dot<T: RealNumber>(lhs: &[T], rhs: &[T]) -> T {
    assert_eq!(lhs.len(), rhs.len(), "dot product dimension mismatch");
    lhs.iter()
        .zip(rhs.iter())
        .fold(T::zero(), |acc, (a, b)| acc + (*a) * (*b))
}

pub fn norm2<T: RealNumber>(data: &[T]) -> T {
    dot(data, data).sqrt()
}

pub fn norm_inf<T: RealNumber>(data: &[T]) -> T {
    data.iter()
        .copied()
        .map(|v| v.abs())
        .fold(T::zero(), |acc, value| acc.max(value))
}

pub fn axpy<T: RealNumber>(alpha: T, x: &[T], y: &mut [T]) {
    assert_eq!(x.len(), y.len(), "axpy dimension mismatch");
    for (xi, yi) in x.iter().zip(y.iter_mut()) {
        *yi += alpha * (*xi);
    }
}

pub fn sub<T: RealNumber>(lhs: &[T], rhs: &[T]) -> Vec<T> {
    assert_eq!(lhs.len(), rhs.len(), "subtraction dimension mismatch");
    lhs.iter().zip(rhs.iter()).map(|(a, b)| *a - *b).collect()
}

/// Index of the entry with the largest magnitude; `0` for an empty slice.
pub fn argmax_abs<T: RealNumber>(data: &[T]) -> usize {
    data.iter()
        .enumerate()
        .fold((0, T::zero()), |best, (j, v)| {
            if v.abs() > best.1 {
                (j, v.abs())
            } else {
                best
            }
        })
        .0
}

/// Wall clock for one search.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::{argmax_abs, axpy, constant, dot, norm2, norm_inf, sub, Scalar, Timer};

    #[test]
    fn test_dot_norms() {
        let v = [3.0 as Scalar, 4.0];
        assert!((dot(&v, &v) - 25.0).abs() < 1e-9);
        assert!((norm2(&v) - 5.0).abs() < 1e-9);
        assert!((norm_inf(&v) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_axpy_and_sub() {
        let x = [1.0 as Scalar, -2.0];
        let mut y = [0.5 as Scalar, 0.5];
        axpy(2.0, &x, &mut y);
        assert!((y[0] - 2.5).abs() < 1e-12);
        assert!((y[1] + 3.5).abs() < 1e-12);
        let d = sub(&y, &x);
        assert!((d[0] - 1.5).abs() < 1e-12);
        assert!((d[1] + 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_constant_and_argmax() {
        let half: Scalar = constant(0.5);
        assert_eq!(half, 0.5);
        assert_eq!(argmax_abs(&[1.0 as Scalar, -3.0, 2.0]), 1);
        assert_eq!(argmax_abs::<Scalar>(&[]), 0);
    }

    #[test]
    fn test_timer_is_monotone() {
        let timer = Timer::start();
        let first = timer.elapsed();
        assert!(timer.elapsed() >= first);
    }
}
