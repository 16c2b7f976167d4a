use core::f64;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Copy)]
pub struct Number(f64);

/// Represents positive infinity.
pub const INFINITE: Number = Number(f64::INFINITY);

impl Number {
    /// Creates a new `Number` from an `f64` value.
    pub fn new(value: f64) -> Self {
        Number(value)
    }

    /// Returns the underlying `f64` value.
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Returns the underlying `i64` value, truncating any fractional part.
    pub fn to_int(self) -> i64 {
        self.0 as i64
    }

    /// Returns `true` if the number represents an integer value.
    ///
    /// Uses epsilon comparison to account for floating-point precision.
    pub fn is_int(&self) -> bool {
        (self.0 - self.0.trunc()).abs() < f64::EPSILON
    }

    /// Returns the absolute value of this number.
    pub fn abs(&self) -> Self {
        Number(self.0.abs())
    }

    /// Returns `true` if the number is zero or very close to zero.
    ///
    /// Uses epsilon comparison to account for floating-point precision.
    pub fn is_zero(&self) -> bool {
        self.0.abs() < f64::EPSILON
    }

    /// Returns `true` if the number is NaN (Not-a-Number).
    pub fn is_nan(&self) -> bool {
        self.0.is_nan()
    }

    /// Computes the factorial for non-negative integer values.
    ///
    /// Returns `None` for negative or fractional inputs, which stay symbolic
    /// during constant folding.
    pub fn factorial(&self) -> Option<Number> {
        if !self.is_int() || self.0 < 0.0 {
            return None;
        }
        let mut acc = 1.0;
        for k in 2..=self.to_int() {
            acc *= k as f64;
        }
        Some(Number(acc))
    }
}

impl Default for Number {
    fn default() -> Self {
        Number(0.0)
    }
}

impl Neg for Number {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Number(-self.0)
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number(value as f64)
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Number(value as f64)
    }
}

impl From<usize> for Number {
    fn from(value: usize) -> Self {
        Number(value as f64)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number(value)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_int() {
            write!(f, "{}", self.0 as i64)
        } else {
            let s = format!("{:.6}", self.0);
            let s = s.trim_end_matches('0').trim_end_matches('.');
            write!(f, "{}", s)
        }
    }
}

impl Add for Number {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Number(self.0 + other.0)
    }
}

impl Sub for Number {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Number(self.0 - other.0)
    }
}

impl Mul for Number {
    type Output = Self;

    fn mul(self, other: Self) -> Self {
        Number(self.0 * other.0)
    }
}

impl Div for Number {
    type Output = Self;

    fn div(self, other: Self) -> Self {
        Number(self.0 / other.0)
    }
}

impl Rem for Number {
    type Output = Self;

    fn rem(self, other: Self) -> Self {
        Number(self.0 % other.0)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for Number {}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.0.is_nan(), other.0.is_nan()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Greater,
            (false, true) => Ordering::Less,
            (false, false) => self.0.partial_cmp(&other.0).unwrap_or(Ordering::Less),
        }
    }
}
