use lazy_static::lazy_static;

#[cfg(test)]
#[ctor::ctor]
fn init_backtrace() {
    color_backtrace::install();
}

pub trait LogAbuse {
    fn ln_or_inf(self) -> f32;
}

impl LogAbuse for f32 {
    fn ln_or_inf(self) -> f32 {
        if self == 0.0 {
            -f32::INFINITY
        } else {
            self.ln()
        }
    }
}

pub trait VecMath {
    fn normalize(&mut self);
    fn sum_f32(&self) -> f32;
}

impl VecMath for [f32] {
    fn normalize(&mut self) {
        let sum = self.sum_f32();
        if sum > 0.0 {
            self.iter_mut().for_each(|item| *item /= sum);
        }
    }

    fn sum_f32(&self) -> f32 {
        self.iter().sum()
    }
}

/// Returns true if `a` and `b` are within `tolerance` of each other.
///
/// Two infinities of the same sign are considered equal.
pub fn f32_close(a: f32, b: f32, tolerance: f32) -> bool {
    if a.is_infinite() || b.is_infinite() {
        a == b
    } else {
        (a - b).abs() <= tolerance
    }
}

lazy_static! {
    pub static ref LOGSUM_LOOKUP: Vec<f32> = {
        let mut f: Vec<f32> = vec![];
        for i in 0..=LOGSUM_TABLE_SIZE {
            f.push((1.0 + (-(i as f64) / LOGSUM_SCALE as f64).exp()).ln() as f32);
        }
        f
    };
}

const LOGSUM_SCALE: f32 = 1000.0;
const LOGSUM_TABLE_SIZE: usize = 16000;
const LOGSUM_CUTOFF: f32 = 15.7;

/// A fast, table driven approximation of the sum of two floats in log space.
///
/// Table entries are linearly interpolated, so the error stays
/// well below the table resolution over long DP recurrences.
#[inline(always)]
pub fn log_add(a: f32, b: f32) -> f32 {
    let min = f32::min(a, b);
    let max = f32::max(a, b);

    debug_assert!(!a.is_nan());
    debug_assert!(!b.is_nan());
    debug_assert!(!a.is_sign_positive() || a.is_finite());
    debug_assert!(!b.is_sign_positive() || b.is_finite());

    if min == -f32::INFINITY || max - min >= LOGSUM_CUTOFF {
        max
    } else {
        let x = (max - min) * LOGSUM_SCALE;
        let idx = x as usize;
        let frac = x - idx as f32;
        max + LOGSUM_LOOKUP[idx] + frac * (LOGSUM_LOOKUP[idx + 1] - LOGSUM_LOOKUP[idx])
    }
}

#[macro_export]
macro_rules! log_sum {
    // Base case:
    ($x:expr) => ($x);
    // `$x` followed by at least one `$y,`
    ($x:expr, $($y:expr),+) => (
        // Call `log_sum!` on the tail `$y`
        $crate::util::log_add($x, $crate::log_sum!($($y),+))
    )
}

#[macro_export]
macro_rules! max_f32 {
    // Base case:
    ($x:expr) => ($x);
    // `$x` followed by at least one `$y,`
    ($x:expr, $($y:expr),+) => (
        // Call `max_f32!` on the tail `$y`
        $x.max($crate::max_f32!($($y),+))
    )
}
