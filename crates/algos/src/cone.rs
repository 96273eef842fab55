//! Second-order cone algebra: Jordan products, arrow solves, step-to-boundary and
//! Nesterov–Todd scaling, all applied block by block over a [`ConeLayout`].

use conicrs_core::error::{SolverError, SolverResult};
use conicrs_core::math::{constant, dot, norm2, RealNumber};
use std::ops::Range;

/// `u0 − ‖u1‖`; positive exactly when `u` lies in the cone interior.
pub fn margin<T: RealNumber>(u: &[T]) -> T {
    u[0] - norm2(&u[1..])
}

/// `u0·v0 − u1ᵀv1`.
fn jdot<T: RealNumber>(u: &[T], v: &[T]) -> T {
    u[0] * v[0] - dot(&u[1..], &v[1..])
}

/// `√((u0 − ‖u1‖)(u0 + ‖u1‖))`, defined on the cone interior only.
pub fn jnorm<T: RealNumber>(u: &[T]) -> SolverResult<T> {
    let tail = norm2(&u[1..]);
    let lower = u[0] - tail;
    if !(lower > T::zero()) {
        return Err(SolverError::breakdown(
            "iterate left the cone interior",
        ));
    }
    Ok((lower * (u[0] + tail)).sqrt())
}

/// `u ∘ v = (uᵀv, u0·v1 + v0·u1)`.
pub fn jordan_product<T: RealNumber>(u: &[T], v: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(u.len());
    out.push(dot(u, v));
    out.extend(
        u[1..]
            .iter()
            .zip(v[1..].iter())
            .map(|(ui, vi)| u[0] * *vi + v[0] * *ui),
    );
    out
}

/// Solves `λ ∘ u = r` for `u`.
pub fn arrow_solve<T: RealNumber>(lambda: &[T], r: &[T]) -> Vec<T> {
    let det = jdot(lambda, lambda);
    let u0 = (lambda[0] * r[0] - dot(&lambda[1..], &r[1..])) / det;
    let mut out = Vec::with_capacity(r.len());
    out.push(u0);
    out.extend(
        r[1..]
            .iter()
            .zip(lambda[1..].iter())
            .map(|(ri, li)| (*ri - u0 * *li) / lambda[0]),
    );
    out
}

/// Largest `α ≥ 0` keeping `u + α·du` in the cone; infinite when the ray never leaves it.
pub fn max_step<T: RealNumber>(u: &[T], du: &[T]) -> T {
    let mut best = if du[0] < T::zero() {
        -u[0] / du[0]
    } else {
        T::infinity()
    };
    if u.len() == 1 {
        return best;
    }
    let a = jdot(du, du);
    let b = jdot(u, du);
    let c = jdot(u, u);
    let mut disc = b * b - a * c;
    if disc < T::zero() {
        if a < T::zero() {
            disc = T::zero();
        } else {
            return best;
        }
    }
    let q = -(b + disc.sqrt().copysign(b));
    let mut roots = Vec::with_capacity(2);
    if a != T::zero() {
        roots.push(q / a);
    }
    if q != T::zero() {
        roots.push(c / q);
    }
    for root in roots {
        if root > T::zero() && root < best {
            best = root;
        }
    }
    best
}

/// Block dimensions of a product of second-order cones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConeLayout {
    dims: Vec<usize>,
    offsets: Vec<usize>,
}

impl ConeLayout {
    pub fn new(dims: Vec<usize>) -> Self {
        let mut offsets = Vec::with_capacity(dims.len());
        let mut acc = 0;
        for d in &dims {
            offsets.push(acc);
            acc += d;
        }
        Self { dims, offsets }
    }

    /// Layout of `n` one-dimensional cones, the non-negative orthant.
    pub fn orthant(n: usize) -> Self {
        Self::new(vec![1; n])
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn n_blocks(&self) -> usize {
        self.dims.len()
    }

    pub fn total(&self) -> usize {
        self.dims.iter().sum()
    }

    pub fn ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        self.offsets
            .iter()
            .zip(self.dims.iter())
            .map(|(start, d)| *start..*start + *d)
    }

    pub fn split<'a, T>(&'a self, v: &'a [T]) -> impl Iterator<Item = &'a [T]> + 'a {
        self.ranges().map(move |range| &v[range])
    }

    /// The cone identity `e`: one on every block head.
    pub fn identity<T: RealNumber>(&self) -> Vec<T> {
        let mut e = vec![T::zero(); self.total()];
        for start in &self.offsets {
            e[*start] = T::one();
        }
        e
    }

    pub fn min_margin<T: RealNumber>(&self, u: &[T]) -> T {
        self.split(u)
            .map(margin)
            .fold(T::infinity(), |acc, m| acc.min(m))
    }

    pub fn is_interior<T: RealNumber>(&self, u: &[T]) -> bool {
        self.n_blocks() > 0 && self.min_margin(u) > T::zero()
    }

    /// Moves `u` into the interior by adding `1 + t` to every block head when the most
    /// violated block margin `t = max(−margin)` is non-negative; interior points are unchanged.
    pub fn shift_into_interior<T: RealNumber>(&self, u: &mut [T]) {
        let worst = -self.min_margin(u);
        if worst >= T::zero() {
            for start in &self.offsets {
                u[*start] += T::one() + worst;
            }
        }
    }

    pub fn jordan_product<T: RealNumber>(&self, u: &[T], v: &[T]) -> Vec<T> {
        self.split(u)
            .zip(self.split(v))
            .flat_map(|(ub, vb)| jordan_product(ub, vb))
            .collect()
    }

    pub fn arrow_solve<T: RealNumber>(&self, lambda: &[T], r: &[T]) -> Vec<T> {
        self.split(lambda)
            .zip(self.split(r))
            .flat_map(|(lb, rb)| arrow_solve(lb, rb))
            .collect()
    }

    pub fn max_step<T: RealNumber>(&self, u: &[T], du: &[T]) -> T {
        self.split(u)
            .zip(self.split(du))
            .map(|(ub, db)| max_step(ub, db))
            .fold(T::infinity(), |acc, a| acc.min(a))
    }
}

#[derive(Debug, Clone)]
struct NtBlock<T> {
    w0: T,
    w1: Vec<T>,
    eta: T,
}

impl<T> NtBlock<T>
where
    T: RealNumber,
{
    fn new(x: &[T], s: &[T]) -> SolverResult<Self> {
        let x_norm = jnorm(x)?;
        let s_norm = jnorm(s)?;
        let x_bar: Vec<T> = x.iter().map(|v| *v / x_norm).collect();
        let s_bar: Vec<T> = s.iter().map(|v| *v / s_norm).collect();
        let inner = T::one() + dot(&x_bar, &s_bar);
        if !(inner > T::zero()) {
            return Err(SolverError::breakdown("degenerate Nesterov-Todd scaling"));
        }
        let two_gamma = constant::<T>(2.0) * (inner / constant(2.0)).sqrt();
        let w0 = (s_bar[0] + x_bar[0]) / two_gamma;
        let w1 = s_bar[1..]
            .iter()
            .zip(x_bar[1..].iter())
            .map(|(sb, xb)| (*sb - *xb) / two_gamma)
            .collect();
        Ok(Self {
            w0,
            w1,
            eta: (s_norm / x_norm).sqrt(),
        })
    }

    fn apply(&self, v: &[T], inverse: bool, out: &mut Vec<T>) {
        let (sign, factor) = if inverse {
            (-T::one(), T::one() / self.eta)
        } else {
            (T::one(), self.eta)
        };
        let t = dot(&self.w1, &v[1..]);
        out.push(factor * (self.w0 * v[0] + sign * t));
        let coupling = t / (T::one() + self.w0);
        out.extend(
            self.w1
                .iter()
                .zip(v[1..].iter())
                .map(|(wi, vi)| factor * (sign * *wi * v[0] + *vi + *wi * coupling)),
        );
    }
}

/// Block-diagonal Nesterov–Todd scaling `W` with `W·x = W⁻¹·s = λ`.
#[derive(Debug, Clone)]
pub struct NtScaling<T> {
    layout: ConeLayout,
    blocks: Vec<NtBlock<T>>,
}

impl<T> NtScaling<T>
where
    T: RealNumber,
{
    pub fn new(layout: &ConeLayout, x: &[T], s: &[T]) -> SolverResult<Self> {
        let blocks = layout
            .split(x)
            .zip(layout.split(s))
            .map(|(xb, sb)| NtBlock::new(xb, sb))
            .collect::<SolverResult<Vec<_>>>()?;
        Ok(Self {
            layout: layout.clone(),
            blocks,
        })
    }

    pub fn layout(&self) -> &ConeLayout {
        &self.layout
    }

    pub fn apply(&self, v: &[T]) -> Vec<T> {
        self.map(v, false)
    }

    pub fn apply_inverse(&self, v: &[T]) -> Vec<T> {
        self.map(v, true)
    }

    fn map(&self, v: &[T], inverse: bool) -> Vec<T> {
        let mut out = Vec::with_capacity(v.len());
        for (block, vb) in self.blocks.iter().zip(self.layout.split(v)) {
            block.apply(vb, inverse, &mut out);
        }
        out
    }
}
