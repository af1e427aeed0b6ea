//! Local values as the bridge sees them.

use xenoabi::PrimitiveKind;

use crate::error::Error;
use crate::proxy::ProxyClass;
use crate::proxy::ProxyObject;

/// A value on the local side of the boundary.
///
/// Equality on `Object` and `Class` is foreign identity, not local identity.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Byte(i8),
    Char(char),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Object(ProxyObject),
    Class(ProxyClass),
}

impl Value {
    /// The primitive kind of a primitive value.
    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        Some(match self {
            Value::Boolean(_) => PrimitiveKind::Boolean,
            Value::Byte(_) => PrimitiveKind::Byte,
            Value::Char(_) => PrimitiveKind::Char,
            Value::Short(_) => PrimitiveKind::Short,
            Value::Int(_) => PrimitiveKind::Int,
            Value::Long(_) => PrimitiveKind::Long,
            Value::Float(_) => PrimitiveKind::Float,
            Value::Double(_) => PrimitiveKind::Double,
            _ => return None,
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short description of the value's kind, for error messages.
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Str(_) => "str".to_string(),
            Value::Object(o) => o.class().name().to_string(),
            Value::Class(c) => format!("class {}", c.name()),
            other => match other.primitive_kind() {
                Some(kind) => kind.keyword().to_string(),
                None => "value".to_string(),
            },
        }
    }
}

macro_rules! from_impl {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

from_impl! {
    bool => Boolean,
    i8 => Byte,
    char => Char,
    i16 => Short,
    i32 => Int,
    i64 => Long,
    f32 => Float,
    f64 => Double,
    String => Str,
    ProxyObject => Object,
    ProxyClass => Class,
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

macro_rules! try_from_impl {
    ($($ty:ty => $variant:ident, $name:literal),* $(,)?) => {
        $(
            impl TryFrom<Value> for $ty {
                type Error = Error;

                fn try_from(value: Value) -> Result<Self, Error> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(Error::type_error($name, other.type_name())),
                    }
                }
            }
        )*
    };
}

try_from_impl! {
    bool => Boolean, "boolean",
    i8 => Byte, "byte",
    char => Char, "char",
    i16 => Short, "short",
    i32 => Int, "int",
    i64 => Long, "long",
    f32 => Float, "float",
    f64 => Double, "double",
    String => Str, "str",
    ProxyObject => Object, "object",
    ProxyClass => Class, "class",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction() {
        let v: i32 = Value::from(7).try_into().expect("int");
        assert_eq!(v, 7);
        let s: String = Value::from("hi").try_into().expect("str");
        assert_eq!(s, "hi");

        let err = i64::try_from(Value::Int(1)).unwrap_err();
        match err {
            Error::TypeError { expected, found } => {
                assert_eq!(expected, "long");
                assert_eq!(found, "int");
            }
            _ => panic!("Expected TypeError, got {:?}", err),
        }
    }

    #[test]
    fn test_primitive_kind() {
        assert_eq!(Value::Char('x').primitive_kind(), Some(PrimitiveKind::Char));
        assert_eq!(Value::Str("x".into()).primitive_kind(), None);
        assert_eq!(Value::Null.type_name(), "null");
        assert!(Value::Null.is_null());
    }
}
