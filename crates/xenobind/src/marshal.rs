//! # Type Marshaler
//!
//! Moves values across the boundary. Outbound, a local [`Value`] is checked
//! against the parameter or field type it is headed for and converted to a
//! [`ForeignValue`]. Inbound, a foreign result becomes a local value, with
//! references wrapped in handles and reclassified by what the runtime says
//! they are.
//!
//! [`conversion`] is the single source of truth for what may cross. Overload
//! scoring and field writes both go through it, so a value that scores for a
//! parameter always marshals for it.
//!
//! ## Invariants
//!
//! - No narrowing: a value never loses range or precision on the way out.
//! - Strings travel as UTF-16 and keep every code point, NUL and astral
//!   characters included.
//! - Every reference created on the way out (strings, boxes) belongs to the
//!   caller's [`Scope`].

use std::sync::Arc;

use xenoabi::ForeignValue;
use xenoabi::PrimitiveKind;
use xenoabi::RawRef;
use xenoabi::RefKind;
use xenoabi::TypeSig;

use crate::CLASS;
use crate::STRING;
use crate::error::Error;
use crate::error::Result;
use crate::handles::HandleKind;
use crate::handles::Scope;
use crate::proxy;
use crate::proxy::ProxyClass;
use crate::proxy::ProxyObject;
use crate::reflect::TypeOracle;
use crate::session::Session;
use crate::value::Value;

/// How a value reaches a target type. Cheaper conversions win overload
/// resolution.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Conversion {
    Exact,
    /// Primitive widening, by number of steps up the ladder.
    Widening(u32),
    /// Reference to a supertype, by inheritance distance.
    Reference(u32),
    /// Primitive boxed into its wrapper, by the wrapper's distance to the target.
    Boxing(u32),
    /// Null into any reference type.
    Null,
}

impl Conversion {
    pub fn cost(self) -> u32 {
        match self {
            Conversion::Exact => 0,
            Conversion::Widening(n) => n,
            Conversion::Reference(d) => d,
            Conversion::Boxing(d) => 10 + d,
            Conversion::Null => 50,
        }
    }
}

/// Steps from `from` to `to` along the widening ladders, if `to` is wider.
fn widening_steps(from: PrimitiveKind, to: PrimitiveKind) -> Option<u32> {
    use PrimitiveKind::*;
    let ladder: &[PrimitiveKind] = match from {
        Byte => &[Short, Int, Long, Float, Double],
        Short | Char => &[Int, Long, Float, Double],
        Int => &[Long, Float, Double],
        Long => &[Float, Double],
        Float => &[Double],
        Boolean | Double => &[],
    };
    ladder.iter().position(|k| *k == to).map(|i| i as u32 + 1)
}

fn reference(distance: u32) -> Conversion {
    if distance == 0 { Conversion::Exact } else { Conversion::Reference(distance) }
}

/// Whether and how `value` converts to `target`. `Ok(None)` means rejected;
/// an error means the runtime could not be asked.
pub fn conversion(value: &Value, target: &TypeSig, oracle: &dyn TypeOracle) -> Result<Option<Conversion>> {
    // A foreign char is one UTF-16 unit.
    if let Value::Char(c) = value {
        if u32::from(*c) > 0xFFFF {
            return Ok(None);
        }
    }
    Ok(match target {
        TypeSig::Void => None,
        TypeSig::Primitive(kind) => match value.primitive_kind() {
            Some(from) if from == *kind => Some(Conversion::Exact),
            Some(from) => widening_steps(from, *kind).map(Conversion::Widening),
            None => None,
        },
        TypeSig::Object(name) => match value {
            Value::Null => Some(Conversion::Null),
            Value::Str(_) => oracle.distance(STRING, name)?.map(reference),
            Value::Object(o) => o.class().distance_to(name).map(reference),
            Value::Class(_) => oracle.distance(CLASS, name)?.map(reference),
            primitive => match primitive.primitive_kind() {
                Some(kind) => oracle.distance(kind.wrapper_class(), name)?.map(Conversion::Boxing),
                None => None,
            },
        },
    })
}

/// Converts a primitive value to `to`. Only called once [`conversion`] has
/// accepted the pair, so every cast here is lossless or a widening.
fn primitive(value: &Value, to: PrimitiveKind) -> Option<ForeignValue> {
    let integral = match value {
        Value::Byte(v) => Some(i64::from(*v)),
        Value::Short(v) => Some(i64::from(*v)),
        Value::Char(c) => Some(i64::from(u32::from(*c))),
        Value::Int(v) => Some(i64::from(*v)),
        Value::Long(v) => Some(*v),
        _ => None,
    };
    Some(match to {
        PrimitiveKind::Boolean => match value {
            Value::Boolean(b) => ForeignValue::Boolean(*b),
            _ => return None,
        },
        PrimitiveKind::Byte => ForeignValue::Byte(integral? as i8),
        PrimitiveKind::Short => ForeignValue::Short(integral? as i16),
        PrimitiveKind::Char => ForeignValue::Char(integral? as u16),
        PrimitiveKind::Int => ForeignValue::Int(integral? as i32),
        PrimitiveKind::Long => ForeignValue::Long(integral?),
        PrimitiveKind::Float => match value {
            Value::Float(v) => ForeignValue::Float(*v),
            _ => ForeignValue::Float(integral? as f32),
        },
        PrimitiveKind::Double => match value {
            Value::Float(v) => ForeignValue::Double(f64::from(*v)),
            Value::Double(v) => ForeignValue::Double(*v),
            _ => ForeignValue::Double(integral? as f64),
        },
    })
}

/// Marshals `value` for a parameter or field of type `target`.
pub fn to_foreign(value: &Value, target: &TypeSig, session: &Session, scope: &mut Scope) -> Result<ForeignValue> {
    let mismatch = || Error::type_error(target, value.type_name());
    let conv = conversion(value, target, session.cache())?.ok_or_else(mismatch)?;
    tracing::trace!(?conv, %target, found = %value.type_name(), "marshaling value");

    match (value, target) {
        (_, TypeSig::Primitive(kind)) => primitive(value, *kind).ok_or_else(mismatch),
        (Value::Null, _) => Ok(ForeignValue::NULL),
        (Value::Str(s), _) => {
            let units: Vec<u16> = s.encode_utf16().collect();
            let raw = session.runtime().new_string(&units)?;
            Ok(ForeignValue::Ref(Some(scope.adopt(raw, HandleKind::Object))))
        }
        (Value::Object(o), _) => Ok(ForeignValue::Ref(Some(o.handle().raw()?))),
        (Value::Class(c), _) => Ok(ForeignValue::Ref(Some(c.handle().raw()?))),
        (boxed, _) => box_primitive(boxed, session, scope),
    }
}

/// Boxes a primitive through its wrapper's `valueOf`.
fn box_primitive(value: &Value, session: &Session, scope: &mut Scope) -> Result<ForeignValue> {
    let kind = value
        .primitive_kind()
        .ok_or_else(|| Error::type_error("primitive", value.type_name()))?;
    let unboxed = primitive(value, kind).ok_or_else(|| Error::type_error(kind, value.type_name()))?;

    let wrapper = session.describe(kind.wrapper_class())?;
    let param = [TypeSig::Primitive(kind)];
    let value_of = wrapper
        .method("valueOf")
        .and_then(|g| g.overloads.iter().find(|o| o.is_static && o.params == param))
        .ok_or_else(|| Error::AttributeNotFound {
            class: wrapper.name().to_string(),
            name: "valueOf".to_string(),
        })?;

    let class = wrapper.handle().raw()?;
    match session.runtime().call_static(class, value_of.id, &[unboxed]) {
        Ok(ForeignValue::Ref(Some(raw))) => Ok(ForeignValue::Ref(Some(scope.adopt(raw, HandleKind::Object)))),
        Ok(other) => Err(Error::type_error(wrapper.name(), format!("{:?}", other))),
        Err(e) => Err(proxy::foreign_failure(session, e)),
    }
}

/// Brings a foreign value home. `declared` is the reported type of the
/// method result or field it came from.
pub fn to_local(value: ForeignValue, declared: &TypeSig, session: &Session) -> Result<Value> {
    if !value.fits(declared) {
        // Take ownership before failing so a stray reference is not leaked.
        if let ForeignValue::Ref(Some(raw)) = value {
            drop(session.registry().wrap(raw, HandleKind::Object));
        }
        return Err(Error::type_error(declared, format!("{:?}", value)));
    }

    Ok(match value {
        ForeignValue::Void | ForeignValue::Ref(None) => Value::Null,
        ForeignValue::Boolean(v) => Value::Boolean(v),
        ForeignValue::Byte(v) => Value::Byte(v),
        ForeignValue::Char(u) => match char::from_u32(u32::from(u)) {
            Some(c) => Value::Char(c),
            None => return Err(Error::type_error("char", format!("unpaired surrogate U+{:04X}", u))),
        },
        ForeignValue::Short(v) => Value::Short(v),
        ForeignValue::Int(v) => Value::Int(v),
        ForeignValue::Long(v) => Value::Long(v),
        ForeignValue::Float(v) => Value::Float(v),
        ForeignValue::Double(v) => Value::Double(v),
        ForeignValue::Ref(Some(raw)) => reference_to_local(raw, session)?,
    })
}

/// Wraps a returned reference and classifies it by its dynamic class.
fn reference_to_local(raw: RawRef, session: &Session) -> Result<Value> {
    let handle = session.registry().wrap(raw, HandleKind::Object);
    let runtime = session.runtime();

    if runtime.ref_kind(raw)? == RefKind::Class {
        let class = session.describe(&runtime.class_name(raw)?)?;
        let handle = Arc::new(handle.retag(HandleKind::Class));
        return Ok(Value::Class(ProxyClass::new(session.clone(), handle, class)));
    }

    let mut scope = Scope::new(session.registry());
    let class_ref = scope.adopt(runtime.object_class(raw)?, HandleKind::Class);
    let name = runtime.class_name(class_ref)?;
    if name == STRING {
        let units = runtime.string_utf16(raw)?;
        return String::from_utf16(&units)
            .map(Value::Str)
            .map_err(|_| Error::type_error("str", "string with an unpaired surrogate"));
    }

    let class = session.describe(&name)?;
    Ok(Value::Object(ProxyObject::new(session.clone(), Arc::new(handle), class)))
}
