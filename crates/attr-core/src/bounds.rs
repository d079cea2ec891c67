//! Min/max bounds for numeric attributes.

use crate::error::{Error, Result};
use crate::kind::ValueKind;
use crate::value::AttributeValue;

/// Position of a value relative to a [`Bounds`] range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundsCheck {
    Below,
    Within,
    Above,
}

/// An inclusive `(min, max)` range of the attribute's own kind.
#[derive(Debug, Clone, Copy)]
pub struct Bounds {
    min: AttributeValue<'static>,
    max: AttributeValue<'static>,
}

impl Bounds {
    /// Create bounds from two values of the same bounded kind.
    ///
    /// Strings, arrays and booleans cannot be bounded.
    pub fn new(min: AttributeValue<'_>, max: AttributeValue<'_>) -> Result<Self> {
        let kind = min.kind();
        if !kind.supports_bounds() {
            return Err(Error::invalid(format!("{kind} does not support bounds")));
        }
        if max.kind() != kind {
            return Err(Error::invalid(format!(
                "bounds kinds differ: {} and {}",
                kind,
                max.kind()
            )));
        }
        let (Some(min), Some(max)) = (min.to_owned_scalar(), max.to_owned_scalar()) else {
            return Err(Error::Unsupported(kind));
        };
        Ok(Self { min, max })
    }

    pub fn kind(&self) -> ValueKind {
        self.min.kind()
    }

    pub fn min(&self) -> &AttributeValue<'static> {
        &self.min
    }

    pub fn max(&self) -> &AttributeValue<'static> {
        &self.max
    }

    /// Locate `value` relative to the range.
    ///
    /// Null values are always within bounds. Values of a different base kind
    /// are rejected with `InvalidArgument`.
    pub fn check(&self, value: &AttributeValue<'_>) -> Result<BoundsCheck> {
        if value.kind().base() != self.kind().base() {
            return Err(Error::invalid(format!(
                "{} value checked against {} bounds",
                value.kind(),
                self.kind()
            )));
        }
        let Some(current) = value.ordinal() else {
            return Ok(BoundsCheck::Within);
        };
        if let Some(min) = self.min.ordinal() {
            if current < min {
                return Ok(BoundsCheck::Below);
            }
        }
        if let Some(max) = self.max.ordinal() {
            if current > max {
                return Ok(BoundsCheck::Above);
            }
        }
        Ok(BoundsCheck::Within)
    }

    /// The bound `value` should be replaced with, if it lies outside the range.
    pub fn clamp(&self, value: &AttributeValue<'_>) -> Result<Option<AttributeValue<'static>>> {
        let replacement = match self.check(value)? {
            BoundsCheck::Below => self.min,
            BoundsCheck::Above => self.max,
            BoundsCheck::Within => return Ok(None),
        };
        // Keep the value's own nullability
        Ok(Some(AttributeValue::new(value.kind(), *replacement.data())?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check() {
        let bounds = Bounds::new(AttributeValue::uint8(1), AttributeValue::uint8(254)).unwrap();
        assert_eq!(bounds.check(&AttributeValue::uint8(0)).unwrap(), BoundsCheck::Below);
        assert_eq!(bounds.check(&AttributeValue::uint8(1)).unwrap(), BoundsCheck::Within);
        assert_eq!(bounds.check(&AttributeValue::uint8(254)).unwrap(), BoundsCheck::Within);
        assert_eq!(bounds.check(&AttributeValue::uint8(255)).unwrap(), BoundsCheck::Above);
    }

    #[test]
    fn test_null_is_within() {
        let bounds = Bounds::new(
            AttributeValue::nullable_int16(Some(-10)),
            AttributeValue::nullable_int16(Some(10)),
        )
        .unwrap();
        assert_eq!(
            bounds.check(&AttributeValue::nullable_int16(None)).unwrap(),
            BoundsCheck::Within
        );
        assert_eq!(
            bounds.check(&AttributeValue::nullable_int16(Some(-11))).unwrap(),
            BoundsCheck::Below
        );
    }

    #[test]
    fn test_float_bounds() {
        let bounds = Bounds::new(AttributeValue::float(-1.0), AttributeValue::float(1.0)).unwrap();
        assert_eq!(bounds.check(&AttributeValue::float(0.5)).unwrap(), BoundsCheck::Within);
        assert_eq!(bounds.check(&AttributeValue::float(1.5)).unwrap(), BoundsCheck::Above);
    }

    #[test]
    fn test_rejects_unbounded_kinds() {
        assert!(
            Bounds::new(AttributeValue::boolean(false), AttributeValue::boolean(true)).is_err()
        );
        assert!(
            Bounds::new(AttributeValue::char_string("a"), AttributeValue::char_string("z")).is_err()
        );
        assert!(Bounds::new(AttributeValue::uint8(0), AttributeValue::uint16(9)).is_err());
    }

    #[test]
    fn test_kind_mismatch_on_check() {
        let bounds = Bounds::new(AttributeValue::uint8(1), AttributeValue::uint8(9)).unwrap();
        assert!(bounds.check(&AttributeValue::uint16(5)).is_err());
    }

    #[test]
    fn test_clamp() {
        let bounds = Bounds::new(AttributeValue::uint16(10), AttributeValue::uint16(20)).unwrap();
        let clamped = bounds.clamp(&AttributeValue::uint16(5)).unwrap().unwrap();
        assert_eq!(clamped.as_u16(), Some(10));
        let clamped = bounds.clamp(&AttributeValue::uint16(25)).unwrap().unwrap();
        assert_eq!(clamped.as_u16(), Some(20));
        assert!(bounds.clamp(&AttributeValue::uint16(15)).unwrap().is_none());
    }
}
