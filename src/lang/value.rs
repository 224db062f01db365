use serde::{Deserialize, Serialize};

/// Runtime value on the data stack.
///
/// Function values are integer code addresses; there is no separate tag
/// for them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// 64-bit signed integer.
    Integer(i64),

    /// 64-bit floating-point number.
    Float(f64),
}

/// A value carried a different tag than the operation required.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("tag mismatch: expected {expected}, found {found}")]
pub struct TagMismatch {
    pub expected: &'static str,
    pub found: &'static str,
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Float(_) => "float",
        }
    }

    /// Checked projection onto the integer tag.
    pub fn as_integer(&self) -> Result<i64, TagMismatch> {
        match self {
            Value::Integer(n) => Ok(*n),
            other => Err(TagMismatch {
                expected: "integer",
                found: other.type_name(),
            }),
        }
    }

    /// Checked projection onto the float tag.
    pub fn as_float(&self) -> Result<f64, TagMismatch> {
        match self {
            Value::Float(n) => Ok(*n),
            other => Err(TagMismatch {
                expected: "float",
                found: other.type_name(),
            }),
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{:?}", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_projection() {
        assert_eq!(Value::Integer(3).as_integer(), Ok(3));
        assert_eq!(Value::Float(1.5).as_float(), Ok(1.5));
        assert_eq!(
            Value::Float(1.5).as_integer(),
            Err(TagMismatch {
                expected: "integer",
                found: "float"
            })
        );
        assert_eq!(
            Value::Integer(1).as_float().unwrap_err().to_string(),
            "tag mismatch: expected float, found integer"
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Integer(-4).to_string(), "-4");
        assert_eq!(Value::Float(2.0).to_string(), "2.0");
    }
}
