//! Typed scalar values used for predicate constants, zone-map bounds and
//! aggregate results.
//!
//! Widened to cover the full set of logical types this engine's columns
//! can carry.

use std::cmp::Ordering;
use std::fmt;

/// A fixed-scale decimal: an unscaled `i128` plus the number of digits after
/// the decimal point. Comparisons and arithmetic are exact (no float
/// conversion).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decimal {
    pub unscaled: i128,
    pub scale: u8,
}

impl Decimal {
    pub fn new(unscaled: i128, scale: u8) -> Self {
        Self { unscaled, scale }
    }

    /// Rescales `self` and `other` to a common scale and compares the
    /// unscaled values exactly.
    fn comparable(self, other: Self) -> (i128, i128) {
        if self.scale == other.scale {
            return (self.unscaled, other.unscaled);
        }
        if self.scale > other.scale {
            let factor = 10i128.pow((self.scale - other.scale) as u32);
            (self.unscaled, other.unscaled * factor)
        } else {
            let factor = 10i128.pow((other.scale - self.scale) as u32);
            (self.unscaled * factor, other.unscaled)
        }
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        let (a, b) = self.comparable(*other);
        a.partial_cmp(&b)
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let (a, b) = self.comparable(*other);
        a.cmp(&b)
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scale = self.scale as u32;
        if scale == 0 {
            return write!(f, "{}", self.unscaled);
        }
        let factor = 10i128.pow(scale);
        let whole = self.unscaled / factor;
        let frac = (self.unscaled % factor).abs();
        write!(f, "{whole}.{frac:0width$}", width = scale as usize)
    }
}

/// The logical (post-decode) type of a column, independent of its Arrow
/// physical representation. Used to validate predicate literals against
/// columns and to pick the right kernel/aggregate implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalType {
    Int64,
    UInt64,
    Float64,
    Decimal,
    Boolean,
    Timestamp,
    Utf8,
    Binary,
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Int64 => "i64",
            Self::UInt64 => "u64",
            Self::Float64 => "f64",
            Self::Decimal => "decimal",
            Self::Boolean => "bool",
            Self::Timestamp => "timestamp",
            Self::Utf8 => "utf8",
            Self::Binary => "binary",
        };
        write!(f, "{name}")
    }
}

/// A single typed value, either a predicate constant, a zone-map bound, or a
/// materialized aggregate result.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    I64(i64),
    U64(u64),
    F64(f64),
    Decimal(Decimal),
    Bool(bool),
    Timestamp(i64),
    Utf8(String),
}

impl Scalar {
    pub fn logical_type(&self) -> LogicalType {
        match self {
            Self::I64(_) => LogicalType::Int64,
            Self::U64(_) => LogicalType::UInt64,
            Self::F64(_) => LogicalType::Float64,
            Self::Decimal(_) => LogicalType::Decimal,
            Self::Bool(_) => LogicalType::Boolean,
            Self::Timestamp(_) => LogicalType::Timestamp,
            Self::Utf8(_) => LogicalType::Utf8,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::I64(v) => Some(*v as f64),
            Self::U64(v) => Some(*v as f64),
            Self::F64(v) => Some(*v),
            Self::Timestamp(v) => Some(*v as f64),
            Self::Decimal(d) => {
                Some(d.unscaled as f64 / 10f64.powi(d.scale as i32))
            }
            Self::Bool(_) | Self::Utf8(_) => None,
        }
    }

    /// Returns the lesser of `self` and `other`, widening via [`Scalar::as_f64`]
    /// for numeric comparisons across physically different-but-comparable
    /// representations (e.g. a running `min` seeded from one chunk and
    /// updated from another's zone map).
    pub fn min_of(self, other: Self) -> Self {
        if self.as_f64().zip(other.as_f64()).map(|(a, b)| a <= b) == Some(true) {
            self
        } else if self.as_f64().is_some() {
            other
        } else if self <= other {
            self
        } else {
            other
        }
    }

    pub fn max_of(self, other: Self) -> Self {
        if self.as_f64().zip(other.as_f64()).map(|(a, b)| a >= b) == Some(true) {
            self
        } else if self.as_f64().is_some() {
            other
        } else if self >= other {
            self
        } else {
            other
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::I64(a), Self::I64(b)) => a.partial_cmp(b),
            (Self::U64(a), Self::U64(b)) => a.partial_cmp(b),
            (Self::F64(a), Self::F64(b)) => a.partial_cmp(b),
            (Self::Decimal(a), Self::Decimal(b)) => a.partial_cmp(b),
            (Self::Bool(a), Self::Bool(b)) => a.partial_cmp(b),
            (Self::Timestamp(a), Self::Timestamp(b)) => a.partial_cmp(b),
            (Self::Utf8(a), Self::Utf8(b)) => a.partial_cmp(b),
            _ => self.as_f64().and_then(|a| other.as_f64().map(|b| (a, b))).and_then(
                |(a, b)| a.partial_cmp(&b),
            ),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I64(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
            Self::Decimal(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Timestamp(v) => write!(f, "{v}"),
            Self::Utf8(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn decimal_exact_compare_across_scales() {
        let a = Decimal::new(150, 1); // 15.0
        let b = Decimal::new(1500, 2); // 15.00
        assert_eq!(a.partial_cmp(&b), Some(Ordering::Equal));

        let c = Decimal::new(1501, 2); // 15.01
        assert_eq!(a.partial_cmp(&c), Some(Ordering::Less));
    }

    #[test]
    fn decimal_display() {
        assert_eq!(Decimal::new(12345, 2).to_string(), "123.45");
        assert_eq!(Decimal::new(5, 2).to_string(), "0.05");
        assert_eq!(Decimal::new(100, 0).to_string(), "100");
    }

    #[test]
    fn scalar_min_max_numeric() {
        let a = Scalar::I64(10);
        let b = Scalar::I64(-3);
        assert_eq!(a.clone().min_of(b.clone()), Scalar::I64(-3));
        assert_eq!(a.max_of(b), Scalar::I64(10));
    }
}
