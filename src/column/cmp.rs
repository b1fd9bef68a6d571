//! Comparison operators shared by predicates, kernels and zone-map decisions.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    LT,
    LTE,
    GT,
    GTE,
    Equal,
    NotEqual,
}

impl Operator {
    /// The operator that, applied to the same operands, yields the negation
    /// of `self`'s result (ignoring NULLs). Used by the zone map to reason
    /// about `≠` via its complement.
    pub fn negate(self) -> Self {
        match self {
            Self::LT => Self::GTE,
            Self::LTE => Self::GT,
            Self::GT => Self::LTE,
            Self::GTE => Self::LT,
            Self::Equal => Self::NotEqual,
            Self::NotEqual => Self::Equal,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::LT => "<",
            Self::LTE => "<=",
            Self::GT => ">",
            Self::GTE => ">=",
            Self::Equal => "=",
            Self::NotEqual => "!=",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, snafu::Snafu)]
#[snafu(display("unrecognised comparison operator \"{op}\""))]
pub struct ParseOperatorError {
    op: String,
}

impl std::str::FromStr for Operator {
    type Err = ParseOperatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Self::LT),
            "<=" => Ok(Self::LTE),
            ">" => Ok(Self::GT),
            ">=" => Ok(Self::GTE),
            "=" | "==" => Ok(Self::Equal),
            "!=" | "<>" => Ok(Self::NotEqual),
            other => ParseOperatorSnafu { op: other.to_owned() }.fail(),
        }
    }
}
