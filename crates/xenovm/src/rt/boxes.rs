//! `java.lang.Number` and the eight primitive wrapper classes.

use xenoabi::PrimitiveKind;

use crate::class::ClassBuilder;
use crate::class::DefineError;
use crate::heap::Slot;
use crate::vm::Ctx;
use crate::vm::State;
use crate::vm::Throw;

use super::arg;
use super::receiver;
use super::string_slot;

pub(crate) fn install(state: &mut State) -> Result<(), DefineError> {
    state.define(
        ClassBuilder::new("java.lang.Number")
            .abstract_class()
            .constructor("()V", |_, _, _| Ok(Slot::Void))
            .abstract_method("intValue", "()I")
            .abstract_method("longValue", "()J")
            .abstract_method("floatValue", "()F")
            .abstract_method("doubleValue", "()D"),
    )?;
    for kind in PrimitiveKind::ALL {
        state.define(wrapper(kind))?;
    }
    Ok(())
}

fn is_numeric(kind: PrimitiveKind) -> bool {
    !matches!(kind, PrimitiveKind::Boolean | PrimitiveKind::Char)
}

/// Primitive cast with the truncating and saturating rules of the source language.
fn cast(slot: Slot, to: PrimitiveKind) -> Slot {
    let integral = match slot {
        Slot::Byte(v) => Some(v as i64),
        Slot::Short(v) => Some(v as i64),
        Slot::Char(v) => Some(v as i64),
        Slot::Int(v) => Some(v as i64),
        Slot::Long(v) => Some(v),
        _ => None,
    };
    let floating = match slot {
        Slot::Float(v) => v as f64,
        Slot::Double(v) => v,
        _ => integral.unwrap_or(0) as f64,
    };
    match (integral, to) {
        (_, PrimitiveKind::Boolean) => slot,
        (Some(v), PrimitiveKind::Byte) => Slot::Byte(v as i8),
        (Some(v), PrimitiveKind::Short) => Slot::Short(v as i16),
        (Some(v), PrimitiveKind::Char) => Slot::Char(v as u16),
        (Some(v), PrimitiveKind::Int) => Slot::Int(v as i32),
        (Some(v), PrimitiveKind::Long) => Slot::Long(v),
        (None, PrimitiveKind::Byte) => Slot::Byte(floating as i32 as i8),
        (None, PrimitiveKind::Short) => Slot::Short(floating as i32 as i16),
        (None, PrimitiveKind::Char) => Slot::Char(floating as i32 as u16),
        (None, PrimitiveKind::Int) => Slot::Int(floating as i32),
        (None, PrimitiveKind::Long) => Slot::Long(floating as i64),
        (_, PrimitiveKind::Float) => match slot {
            Slot::Long(v) => Slot::Float(v as f32),
            Slot::Float(v) => Slot::Float(v),
            _ => Slot::Float(floating as f32),
        },
        (_, PrimitiveKind::Double) => Slot::Double(floating),
    }
}

fn hash(slot: Slot) -> i32 {
    match slot {
        Slot::Boolean(v) => if v { 1231 } else { 1237 },
        Slot::Byte(v) => v as i32,
        Slot::Char(v) => v as i32,
        Slot::Short(v) => v as i32,
        Slot::Int(v) => v,
        Slot::Long(v) => (v ^ ((v as u64) >> 32) as i64) as i32,
        Slot::Float(v) => v.to_bits() as i32,
        Slot::Double(v) => {
            let bits = v.to_bits();
            (bits ^ (bits >> 32)) as i32
        }
        _ => 0,
    }
}

fn value(ctx: &mut Ctx<'_>, this: Option<crate::ObjId>) -> Result<Slot, Throw> {
    let me = receiver(ctx, this)?;
    ctx.field(me, "value")
}

/// `MIN_VALUE`, `MAX_VALUE` and `SIZE` (in bits) where the wrapper has them.
fn limits(kind: PrimitiveKind) -> Option<(Slot, Slot, i32)> {
    Some(match kind {
        PrimitiveKind::Boolean => return None,
        PrimitiveKind::Byte => (Slot::Byte(i8::MIN), Slot::Byte(i8::MAX), 8),
        PrimitiveKind::Char => (Slot::Char(u16::MIN), Slot::Char(u16::MAX), 16),
        PrimitiveKind::Short => (Slot::Short(i16::MIN), Slot::Short(i16::MAX), 16),
        PrimitiveKind::Int => (Slot::Int(i32::MIN), Slot::Int(i32::MAX), 32),
        PrimitiveKind::Long => (Slot::Long(i64::MIN), Slot::Long(i64::MAX), 64),
        PrimitiveKind::Float => (Slot::Float(f32::from_bits(1)), Slot::Float(f32::MAX), 32),
        PrimitiveKind::Double => (Slot::Double(f64::from_bits(1)), Slot::Double(f64::MAX), 64),
    })
}

fn wrapper(kind: PrimitiveKind) -> ClassBuilder {
    let name = kind.wrapper_class();
    let d = kind.descriptor();
    let ctor = format!("({})V", d);

    let mut builder = ClassBuilder::new(name).field("value", &d.to_string()).constructor(&ctor, |ctx, this, args| {
        let me = receiver(ctx, this)?;
        ctx.set_field(me, "value", arg(args, 0))?;
        Ok(Slot::Void)
    });
    if is_numeric(kind) {
        builder = builder.extends("java.lang.Number");
    }

    builder = builder
        .static_method("valueOf", &format!("({})L{};", d, name.replace('.', "/")), move |ctx, _, args| {
            let boxed = ctx.construct(name, &ctor, &[arg(args, 0)])?;
            Ok(Slot::Ref(boxed))
        })
        .method("toString", "()Ljava/lang/String;", |ctx, this, _| {
            let v = value(ctx, this)?;
            let text = ctx.display(v)?;
            Ok(string_slot(ctx, &text))
        })
        .method("hashCode", "()I", |ctx, this, _| Ok(Slot::Int(hash(value(ctx, this)?))))
        .method("equals", "(Ljava/lang/Object;)Z", |ctx, this, args| {
            let me = receiver(ctx, this)?;
            let equal = match arg(args, 0) {
                Slot::Ref(other) if ctx.class_of(other) == ctx.class_of(me) => {
                    ctx.field(me, "value")? == ctx.field(other, "value")?
                }
                _ => false,
            };
            Ok(Slot::Boolean(equal))
        });

    // Numbers convert to every numeric kind; the others only unwrap to themselves.
    let conversions: Vec<PrimitiveKind> = if is_numeric(kind) {
        PrimitiveKind::ALL.into_iter().filter(|k| is_numeric(*k)).collect()
    } else {
        vec![kind]
    };
    for target in conversions {
        builder = builder.method(&format!("{}Value", target.keyword()), &format!("(){}", target.descriptor()), move |ctx, this, _| {
            Ok(cast(value(ctx, this)?, target))
        });
    }

    if let Some((min, max, size)) = limits(kind) {
        builder = builder
            .static_field("MIN_VALUE", &d.to_string(), min)
            .static_field("MAX_VALUE", &d.to_string(), max)
            .static_field("SIZE", "I", Slot::Int(size));
    }

    match kind {
        PrimitiveKind::Int => builder.static_method("parseInt", "(Ljava/lang/String;)I", |ctx, _, args| {
            let text = ctx.string(arg(args, 0))?;
            match text.trim().parse::<i32>() {
                Ok(v) => Ok(Slot::Int(v)),
                Err(_) => Err(number_format(ctx, &text)),
            }
        }),
        PrimitiveKind::Long => builder.static_method("parseLong", "(Ljava/lang/String;)J", |ctx, _, args| {
            let text = ctx.string(arg(args, 0))?;
            match text.trim().parse::<i64>() {
                Ok(v) => Ok(Slot::Long(v)),
                Err(_) => Err(number_format(ctx, &text)),
            }
        }),
        PrimitiveKind::Double => builder.static_method("parseDouble", "(Ljava/lang/String;)D", |ctx, _, args| {
            let text = ctx.string(arg(args, 0))?;
            match text.trim().parse::<f64>() {
                Ok(v) => Ok(Slot::Double(v)),
                Err(_) => Err(number_format(ctx, &text)),
            }
        }),
        PrimitiveKind::Boolean => builder.static_method("parseBoolean", "(Ljava/lang/String;)Z", |ctx, _, args| {
            Ok(Slot::Boolean(match arg(args, 0) {
                Slot::Ref(_) => ctx.string(arg(args, 0))?.eq_ignore_ascii_case("true"),
                _ => false,
            }))
        }),
        _ => builder,
    }
}

fn number_format(ctx: &mut Ctx<'_>, text: &str) -> Throw {
    let message = format!("For input string: \"{}\"", text);
    ctx.throw("java.lang.NumberFormatException", Some(&message))
}
