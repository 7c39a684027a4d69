use thiserror::Error;

/// Errors that can occur when creating a [`Bracket`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BracketError {
    #[error("non-finite endpoint(s)")]
    NonFinite,
    #[error("zero width")]
    ZeroWidth,
    #[error("no sign change")]
    NoSignChange,
}

/// A time interval whose endpoints fall on opposite sides of an event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    left: f64,
    right: f64,
    left_sign: Sign,
}

impl Bracket {
    /// Creates a validated bracket over `[left, right]`.
    ///
    /// # Errors
    ///
    /// Returns `BracketError` if the endpoints are non-finite, not strictly
    /// increasing, or carry the same sign.
    pub fn new(left: f64, right: f64, left_sign: Sign, right_sign: Sign) -> Result<Self, BracketError> {
        if !left.is_finite() || !right.is_finite() {
            return Err(BracketError::NonFinite);
        }
        if left >= right {
            return Err(BracketError::ZeroWidth);
        }
        if left_sign == right_sign {
            return Err(BracketError::NoSignChange);
        }
        Ok(Self {
            left,
            right,
            left_sign,
        })
    }

    #[must_use]
    pub fn left(&self) -> f64 {
        self.left
    }

    #[must_use]
    pub fn right(&self) -> f64 {
        self.right
    }

    #[must_use]
    pub fn midpoint(&self) -> f64 {
        0.5 * (self.left + self.right)
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    /// Returns true if the bracket width satisfies the time tolerances.
    #[must_use]
    pub fn is_converged(&self, abs_tol: f64, rel_tol: f64) -> bool {
        self.width() <= abs_tol + rel_tol * self.right.abs()
    }

    /// Replaces the endpoint that shares `sign` with `t`.
    pub fn shrink(&mut self, t: f64, sign: Sign) {
        if sign == self.left_sign {
            self.left = t;
        } else {
            self.right = t;
        }
    }
}

/// The sign of an event indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sign {
    /// Indicator is positive (or zero).
    Positive,
    /// Indicator is negative.
    Negative,
}

impl Sign {
    #[must_use]
    pub fn of(value: f64) -> Self {
        if value >= 0.0 {
            Sign::Positive
        } else {
            Sign::Negative
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn rejects_invalid_endpoints() {
        assert_eq!(
            Bracket::new(f64::NAN, 1.0, Sign::Negative, Sign::Positive),
            Err(BracketError::NonFinite)
        );
        assert_eq!(
            Bracket::new(2.0, 2.0, Sign::Negative, Sign::Positive),
            Err(BracketError::ZeroWidth)
        );
        assert_eq!(
            Bracket::new(0.0, 1.0, Sign::Positive, Sign::Positive),
            Err(BracketError::NoSignChange)
        );
    }

    #[test]
    fn shrink_replaces_matching_endpoint() {
        let mut bracket =
            Bracket::new(0.0, 2.0, Sign::Negative, Sign::Positive).expect("valid bracket");

        bracket.shrink(1.0, Sign::Negative);
        assert_relative_eq!(bracket.left(), 1.0);
        assert_relative_eq!(bracket.right(), 2.0);

        bracket.shrink(1.5, Sign::Positive);
        assert_relative_eq!(bracket.left(), 1.0);
        assert_relative_eq!(bracket.right(), 1.5);
        assert!(bracket.is_converged(0.5, 0.0));
        assert!(!bracket.is_converged(0.1, 0.0));
    }
}
