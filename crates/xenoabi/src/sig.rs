//! # Type signatures
//!
//! Foreign types as the reflection interface reports them. Class names are
//! always carried in dotted form (`java.lang.String`); the slashed binary
//! form only appears inside descriptors and is converted at parse time.

use std::fmt;

use crate::ForeignError;

/// The eight foreign primitive kinds.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 8] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Byte,
        PrimitiveKind::Char,
        PrimitiveKind::Short,
        PrimitiveKind::Int,
        PrimitiveKind::Long,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
    ];

    /// Single-character descriptor code (`I` for int, `Z` for boolean, ...).
    pub fn descriptor(self) -> char {
        match self {
            PrimitiveKind::Boolean => 'Z',
            PrimitiveKind::Byte => 'B',
            PrimitiveKind::Char => 'C',
            PrimitiveKind::Short => 'S',
            PrimitiveKind::Int => 'I',
            PrimitiveKind::Long => 'J',
            PrimitiveKind::Float => 'F',
            PrimitiveKind::Double => 'D',
        }
    }

    pub fn from_descriptor(c: char) -> Option<Self> {
        PrimitiveKind::ALL.into_iter().find(|k| k.descriptor() == c)
    }

    /// Source-level keyword, used in signatures shown to users.
    pub fn keyword(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "boolean",
            PrimitiveKind::Byte => "byte",
            PrimitiveKind::Char => "char",
            PrimitiveKind::Short => "short",
            PrimitiveKind::Int => "int",
            PrimitiveKind::Long => "long",
            PrimitiveKind::Float => "float",
            PrimitiveKind::Double => "double",
        }
    }

    /// The reference class that boxes this primitive.
    pub fn wrapper_class(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "java.lang.Boolean",
            PrimitiveKind::Byte => "java.lang.Byte",
            PrimitiveKind::Char => "java.lang.Character",
            PrimitiveKind::Short => "java.lang.Short",
            PrimitiveKind::Int => "java.lang.Integer",
            PrimitiveKind::Long => "java.lang.Long",
            PrimitiveKind::Float => "java.lang.Float",
            PrimitiveKind::Double => "java.lang.Double",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A parameter, field or return type.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum TypeSig {
    Void,
    Primitive(PrimitiveKind),
    /// A reference type, by dotted class name.
    Object(String),
}

impl TypeSig {
    pub fn object(name: &str) -> Self {
        TypeSig::Object(dotted(name))
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, TypeSig::Object(_))
    }

    /// Encodes back into descriptor form (`Ljava/lang/String;`).
    pub fn descriptor(&self) -> String {
        match self {
            TypeSig::Void => "V".to_string(),
            TypeSig::Primitive(kind) => kind.descriptor().to_string(),
            TypeSig::Object(name) => format!("L{};", name.replace('.', "/")),
        }
    }

    /// Parses a single field descriptor such as `I` or `Ljava/lang/Object;`.
    pub fn parse(descriptor: &str) -> Result<Self, ForeignError> {
        let mut chars = descriptor.chars().peekable();
        let sig = parse_one(&mut chars, descriptor)?;
        if chars.next().is_some() {
            return Err(ForeignError::BadDescriptor(descriptor.to_string()));
        }
        Ok(sig)
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Void => f.write_str("void"),
            TypeSig::Primitive(kind) => write!(f, "{}", kind),
            TypeSig::Object(name) => f.write_str(name),
        }
    }
}

/// Normalizes a class name to dotted form.
pub fn dotted(name: &str) -> String {
    name.replace('/', ".")
}

/// Parses a method descriptor such as `(ILjava/lang/String;)V` into its
/// parameter types and return type.
pub fn parse_method_descriptor(descriptor: &str) -> Result<(Vec<TypeSig>, TypeSig), ForeignError> {
    let bad = || ForeignError::BadDescriptor(descriptor.to_string());
    let mut chars = descriptor.chars().peekable();
    if chars.next() != Some('(') {
        return Err(bad());
    }

    let mut params = Vec::new();
    loop {
        match chars.peek() {
            Some(')') => {
                chars.next();
                break;
            }
            Some('V') => return Err(bad()),
            Some(_) => params.push(parse_one(&mut chars, descriptor)?),
            None => return Err(bad()),
        }
    }

    let ret = match chars.peek() {
        Some('V') => {
            chars.next();
            TypeSig::Void
        }
        _ => parse_one(&mut chars, descriptor)?,
    };
    if chars.next().is_some() {
        return Err(bad());
    }
    Ok((params, ret))
}

fn parse_one(chars: &mut std::iter::Peekable<std::str::Chars<'_>>, descriptor: &str) -> Result<TypeSig, ForeignError> {
    let bad = || ForeignError::BadDescriptor(descriptor.to_string());
    match chars.next() {
        Some('L') => {
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some(';') => break,
                    Some(c) => name.push(c),
                    None => return Err(bad()),
                }
            }
            if name.is_empty() {
                return Err(bad());
            }
            Ok(TypeSig::Object(dotted(&name)))
        }
        Some(c) => PrimitiveKind::from_descriptor(c).map(TypeSig::Primitive).ok_or_else(bad),
        None => Err(bad()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method_descriptor() {
        let (params, ret) = parse_method_descriptor("(ILjava/lang/String;D)V").expect("valid descriptor");
        assert_eq!(
            params,
            vec![
                TypeSig::Primitive(PrimitiveKind::Int),
                TypeSig::Object("java.lang.String".into()),
                TypeSig::Primitive(PrimitiveKind::Double),
            ]
        );
        assert_eq!(ret, TypeSig::Void);

        let (params, ret) = parse_method_descriptor("()Ljava/util/List;").expect("valid descriptor");
        assert!(params.is_empty());
        assert_eq!(ret, TypeSig::object("java/util/List"));
    }

    #[test]
    fn test_rejects_malformed_descriptors() {
        for bad in ["", "I)V", "(I", "(V)V", "(Ljava/lang/String)V", "(L;)V", "(Q)V", "()VV", "()"] {
            assert!(parse_method_descriptor(bad).is_err(), "accepted {:?}", bad);
        }
        assert!(TypeSig::parse("II").is_err());
    }

    #[test]
    fn test_descriptor_round_trip() {
        for desc in ["Z", "B", "C", "S", "I", "J", "F", "D", "Ljava/lang/Object;"] {
            assert_eq!(TypeSig::parse(desc).expect("valid").descriptor(), desc);
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(TypeSig::Primitive(PrimitiveKind::Long).to_string(), "long");
        assert_eq!(TypeSig::object("java/awt/Dimension").to_string(), "java.awt.Dimension");
        assert_eq!(PrimitiveKind::Char.wrapper_class(), "java.lang.Character");
    }
}
