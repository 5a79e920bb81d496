use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// A numeric form field as it arrives from a request body or a text input.
///
/// Numbers and numeric strings are accepted; anything else (missing, `null`,
/// booleans, garbage text, non-finite values) is held as absent instead of
/// failing deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NumericField(Option<f64>);

impl NumericField {
    pub const ABSENT: Self = Self(None);

    pub fn new(value: f64) -> Self {
        if value.is_finite() {
            Self(Some(value))
        } else {
            Self::ABSENT
        }
    }

    /// Parse free text the same way a numeric string on the wire is parsed.
    pub fn parse(text: &str) -> Self {
        text.trim().parse::<f64>().map(Self::new).unwrap_or(Self::ABSENT)
    }

    pub fn value(&self) -> Option<f64> {
        self.0
    }

    /// The value when it can contribute to an amount: present and strictly
    /// positive. Zero, negative and absent values contribute nothing.
    pub fn contributing(&self) -> Option<f64> {
        self.0.filter(|v| *v > 0.0)
    }
}

impl From<f64> for NumericField {
    fn from(value: f64) -> Self {
        Self::new(value)
    }
}

impl fmt::Display for NumericField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(v) => write!(f, "{v}"),
            None => Ok(()),
        }
    }
}

impl<'de> Deserialize<'de> for NumericField {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<Value>::deserialize(deserializer)?;
        Ok(match raw {
            Some(Value::Number(n)) => n.as_f64().map(Self::new).unwrap_or(Self::ABSENT),
            Some(Value::String(s)) => Self::parse(&s),
            _ => Self::ABSENT,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_json(text: &str) -> NumericField {
        serde_json::from_str(text).unwrap()
    }

    #[test]
    fn accepts_numbers_and_numeric_strings() {
        assert_eq!(from_json("40").value(), Some(40.0));
        assert_eq!(from_json("30.5").value(), Some(30.5));
        assert_eq!(from_json("\" 12.5 \"").value(), Some(12.5));
    }

    #[test]
    fn anything_else_is_absent() {
        for text in ["null", "true", "\"abc\"", "\"\"", "[1]", "{}"] {
            assert_eq!(from_json(text), NumericField::ABSENT, "input {text}");
        }
    }

    #[test]
    fn only_positive_values_contribute() {
        assert_eq!(NumericField::new(3.0).contributing(), Some(3.0));
        assert_eq!(NumericField::new(0.0).contributing(), None);
        assert_eq!(NumericField::new(-2.0).contributing(), None);
        assert_eq!(NumericField::new(f64::NAN).contributing(), None);
        assert_eq!(NumericField::ABSENT.contributing(), None);
    }

    #[test]
    fn serializes_as_plain_number_or_null() {
        assert_eq!(serde_json::to_string(&NumericField::new(2.5)).unwrap(), "2.5");
        assert_eq!(serde_json::to_string(&NumericField::ABSENT).unwrap(), "null");
    }
}
