//! `java.lang`: the root classes, strings, math, system properties and throwables.

use std::f64::consts;

use crate::CLASS;
use crate::OBJECT;
use crate::STRING;
use crate::class::ClassBuilder;
use crate::class::DefineError;
use crate::heap::Payload;
use crate::heap::Slot;
use crate::vm::Ctx;
use crate::vm::State;
use crate::vm::Throw;

use super::arg;
use super::double_arg;
use super::float_arg;
use super::identity_hash;
use super::int_arg;
use super::long_arg;
use super::receiver;
use super::string_slot;

const THROWABLES: &[(&str, &str)] = &[
    ("java.lang.Exception", "java.lang.Throwable"),
    ("java.lang.Error", "java.lang.Throwable"),
    ("java.lang.RuntimeException", "java.lang.Exception"),
    ("java.lang.ClassNotFoundException", "java.lang.Exception"),
    ("java.lang.InstantiationException", "java.lang.Exception"),
    ("java.lang.IllegalArgumentException", "java.lang.RuntimeException"),
    ("java.lang.IllegalStateException", "java.lang.RuntimeException"),
    ("java.lang.NumberFormatException", "java.lang.IllegalArgumentException"),
    ("java.lang.NullPointerException", "java.lang.RuntimeException"),
    ("java.lang.ArithmeticException", "java.lang.RuntimeException"),
    ("java.lang.UnsupportedOperationException", "java.lang.RuntimeException"),
    ("java.lang.IndexOutOfBoundsException", "java.lang.RuntimeException"),
    ("java.lang.StringIndexOutOfBoundsException", "java.lang.IndexOutOfBoundsException"),
    ("java.lang.NoClassDefFoundError", "java.lang.Error"),
    ("java.lang.NoSuchFieldError", "java.lang.Error"),
    ("java.lang.NoSuchMethodError", "java.lang.Error"),
    ("java.lang.AbstractMethodError", "java.lang.Error"),
];

pub(crate) fn install(state: &mut State) -> Result<(), DefineError> {
    state.define(object())?;
    state.define(class())?;
    state.define(char_sequence())?;
    state.define(string())?;
    state.define(throwable())?;
    for (name, parent) in THROWABLES {
        state.define(throwable_subclass(name, parent))?;
    }
    state.define(math())?;
    state.define(system())?;
    for name in ["java.lang.reflect.Method", "java.lang.reflect.Constructor", "java.lang.reflect.Field"] {
        state.define(reflected_member(name))?;
    }
    Ok(())
}

fn object() -> ClassBuilder {
    ClassBuilder::new(OBJECT)
        .constructor("()V", |_, _, _| Ok(Slot::Void))
        .method("equals", "(Ljava/lang/Object;)Z", |ctx, this, args| {
            let me = receiver(ctx, this)?;
            Ok(Slot::Boolean(args.first() == Some(&Slot::Ref(me))))
        })
        .method("hashCode", "()I", |ctx, this, _| Ok(Slot::Int(identity_hash(receiver(ctx, this)?))))
        .method("toString", "()Ljava/lang/String;", |ctx, this, _| {
            let me = receiver(ctx, this)?;
            let text = format!("{}@{:x}", ctx.class_name(ctx.class_of(me)), identity_hash(me));
            Ok(string_slot(ctx, &text))
        })
        .method("getClass", "()Ljava/lang/Class;", |ctx, this, _| {
            let me = receiver(ctx, this)?;
            Ok(Slot::Ref(ctx.mirror(ctx.class_of(me))))
        })
}

fn class() -> ClassBuilder {
    fn mirrored(ctx: &mut Ctx<'_>, this: Option<crate::ObjId>) -> Result<crate::ClassId, Throw> {
        let me = receiver(ctx, this)?;
        ctx.mirrored_class(me).ok_or_else(|| ctx.illegal_argument("not a class object"))
    }

    ClassBuilder::new(CLASS)
        .method("getName", "()Ljava/lang/String;", |ctx, this, _| {
            let class = mirrored(ctx, this)?;
            let name = ctx.class_name(class).to_string();
            Ok(string_slot(ctx, &name))
        })
        .method("getSimpleName", "()Ljava/lang/String;", |ctx, this, _| {
            let class = mirrored(ctx, this)?;
            let name = ctx.class_name(class);
            let simple = name.rsplit(['.', '$']).next().unwrap_or(name).to_string();
            Ok(string_slot(ctx, &simple))
        })
        .method("isInterface", "()Z", |ctx, this, _| {
            let class = mirrored(ctx, this)?;
            Ok(Slot::Boolean(ctx.is_interface(class)))
        })
        .method("isInstance", "(Ljava/lang/Object;)Z", |ctx, this, args| {
            let class = mirrored(ctx, this)?;
            Ok(Slot::Boolean(match args.first() {
                Some(Slot::Ref(obj)) => ctx.is_subclass(ctx.class_of(*obj), class),
                _ => false,
            }))
        })
        .method("getSuperclass", "()Ljava/lang/Class;", |ctx, this, _| {
            let class = mirrored(ctx, this)?;
            Ok(ctx.superclass(class).map_or(Slot::Null, |s| Slot::Ref(ctx.mirror(s))))
        })
        .method("toString", "()Ljava/lang/String;", |ctx, this, _| {
            let class = mirrored(ctx, this)?;
            let kind = if ctx.is_interface(class) { "interface" } else { "class" };
            let text = format!("{} {}", kind, ctx.class_name(class));
            Ok(string_slot(ctx, &text))
        })
        .static_method("forName", "(Ljava/lang/String;)Ljava/lang/Class;", |ctx, _, args| {
            let name = ctx.string(arg(args, 0))?;
            match ctx.find_class(&name) {
                Some(class) => Ok(Slot::Ref(ctx.mirror(class))),
                None => Err(ctx.throw("java.lang.ClassNotFoundException", Some(&name))),
            }
        })
}

fn char_sequence() -> ClassBuilder {
    ClassBuilder::interface("java.lang.CharSequence")
        .abstract_method("length", "()I")
        .abstract_method("charAt", "(I)C")
        .abstract_method("toString", "()Ljava/lang/String;")
}

/// Code units of the receiver string.
fn units(ctx: &mut Ctx<'_>, this: Option<crate::ObjId>) -> Result<Vec<u16>, Throw> {
    let me = receiver(ctx, this)?;
    ctx.string_units(Slot::Ref(me))
}

fn out_of_bounds(ctx: &mut Ctx<'_>, index: i32, len: usize) -> Throw {
    let message = format!("index {} out of bounds for length {}", index, len);
    ctx.throw("java.lang.StringIndexOutOfBoundsException", Some(&message))
}

fn string() -> ClassBuilder {
    let mut builder = ClassBuilder::new(STRING)
        .implements("java.lang.CharSequence")
        .constructor("()V", |ctx, this, _| {
            let me = receiver(ctx, this)?;
            ctx.set_payload(me, Payload::Str(Vec::new()));
            Ok(Slot::Void)
        })
        .constructor("(Ljava/lang/String;)V", |ctx, this, args| {
            let me = receiver(ctx, this)?;
            let copied = ctx.string_units(arg(args, 0))?;
            ctx.set_payload(me, Payload::Str(copied));
            Ok(Slot::Void)
        })
        .method("length", "()I", |ctx, this, _| Ok(Slot::Int(units(ctx, this)?.len() as i32)))
        .method("isEmpty", "()Z", |ctx, this, _| Ok(Slot::Boolean(units(ctx, this)?.is_empty())))
        .method("charAt", "(I)C", |ctx, this, args| {
            let s = units(ctx, this)?;
            let index = int_arg(ctx, args, 0)?;
            match usize::try_from(index).ok().and_then(|i| s.get(i)) {
                Some(unit) => Ok(Slot::Char(*unit)),
                None => Err(out_of_bounds(ctx, index, s.len())),
            }
        })
        .method("codePointAt", "(I)I", |ctx, this, args| {
            let s = units(ctx, this)?;
            let index = int_arg(ctx, args, 0)?;
            let Some(start) = usize::try_from(index).ok().filter(|i| *i < s.len()) else {
                return Err(out_of_bounds(ctx, index, s.len()));
            };
            let point = char::decode_utf16(s[start..].iter().copied())
                .next()
                .map_or(s[start] as u32, |c| c.map_or(s[start] as u32, u32::from));
            Ok(Slot::Int(point as i32))
        })
        .method("concat", "(Ljava/lang/String;)Ljava/lang/String;", |ctx, this, args| {
            let mut s = units(ctx, this)?;
            s.extend(ctx.string_units(arg(args, 0))?);
            Ok(Slot::Ref(ctx.new_string_utf16(s)))
        })
        .method("substring", "(I)Ljava/lang/String;", |ctx, this, args| {
            let s = units(ctx, this)?;
            let begin = int_arg(ctx, args, 0)?;
            substring(ctx, s, begin, None)
        })
        .method("substring", "(II)Ljava/lang/String;", |ctx, this, args| {
            let s = units(ctx, this)?;
            let begin = int_arg(ctx, args, 0)?;
            let end = int_arg(ctx, args, 1)?;
            substring(ctx, s, begin, Some(end))
        })
        .method("indexOf", "(Ljava/lang/String;)I", |ctx, this, args| {
            let s = units(ctx, this)?;
            let needle = ctx.string_units(arg(args, 0))?;
            let found = if needle.is_empty() {
                Some(0)
            } else {
                s.windows(needle.len()).position(|w| w == needle.as_slice())
            };
            Ok(Slot::Int(found.map_or(-1, |i| i as i32)))
        })
        .method("toUpperCase", "()Ljava/lang/String;", |ctx, this, _| {
            let me = receiver(ctx, this)?;
            let s = ctx.string(Slot::Ref(me))?;
            Ok(string_slot(ctx, &s.to_uppercase()))
        })
        .method("toLowerCase", "()Ljava/lang/String;", |ctx, this, _| {
            let me = receiver(ctx, this)?;
            let s = ctx.string(Slot::Ref(me))?;
            Ok(string_slot(ctx, &s.to_lowercase()))
        })
        .method("equals", "(Ljava/lang/Object;)Z", |ctx, this, args| {
            let s = units(ctx, this)?;
            let equal = match args.first() {
                Some(Slot::Ref(other)) => ctx.utf16(*other) == Some(s.as_slice()),
                _ => false,
            };
            Ok(Slot::Boolean(equal))
        })
        .method("hashCode", "()I", |ctx, this, _| {
            let hash = units(ctx, this)?.iter().fold(0i32, |h, u| h.wrapping_mul(31).wrapping_add(*u as i32));
            Ok(Slot::Int(hash))
        })
        .method("toString", "()Ljava/lang/String;", |ctx, this, _| Ok(Slot::Ref(receiver(ctx, this)?)));

    for descriptor in ["Z", "C", "I", "J", "F", "D", "Ljava/lang/Object;"] {
        builder = builder.static_method("valueOf", &format!("({})Ljava/lang/String;", descriptor), value_of);
    }
    builder
}

fn value_of(ctx: &mut Ctx<'_>, _: Option<crate::ObjId>, args: &[Slot]) -> Result<Slot, Throw> {
    let text = ctx.display(arg(args, 0))?;
    Ok(string_slot(ctx, &text))
}

fn substring(ctx: &mut Ctx<'_>, s: Vec<u16>, begin: i32, end: Option<i32>) -> Result<Slot, Throw> {
    let end = end.unwrap_or(s.len() as i32);
    if begin < 0 || end < begin || end as usize > s.len() {
        return Err(out_of_bounds(ctx, if begin < 0 { begin } else { end }, s.len()));
    }
    Ok(Slot::Ref(ctx.new_string_utf16(s[begin as usize..end as usize].to_vec())))
}

fn message_ctor(ctx: &mut Ctx<'_>, this: Option<crate::ObjId>, args: &[Slot]) -> Result<Slot, Throw> {
    let me = receiver(ctx, this)?;
    ctx.set_field(me, "message", arg(args, 0))?;
    Ok(Slot::Void)
}

fn throwable() -> ClassBuilder {
    ClassBuilder::new("java.lang.Throwable")
        .field("message", "Ljava/lang/String;")
        .constructor("()V", |_, _, _| Ok(Slot::Void))
        .constructor("(Ljava/lang/String;)V", message_ctor)
        .method("getMessage", "()Ljava/lang/String;", |ctx, this, _| {
            let me = receiver(ctx, this)?;
            ctx.field(me, "message")
        })
        .method("toString", "()Ljava/lang/String;", |ctx, this, _| {
            let me = receiver(ctx, this)?;
            let name = ctx.class_name(ctx.class_of(me)).to_string();
            let text = match ctx.field(me, "message")? {
                Slot::Null => name,
                message => format!("{}: {}", name, ctx.display(message)?),
            };
            Ok(string_slot(ctx, &text))
        })
}

fn throwable_subclass(name: &str, parent: &str) -> ClassBuilder {
    ClassBuilder::new(name)
        .extends(parent)
        .constructor("()V", |_, _, _| Ok(Slot::Void))
        .constructor("(Ljava/lang/String;)V", message_ctor)
}

fn math() -> ClassBuilder {
    let unary: [(&str, fn(f64) -> f64); 10] = [
        ("sin", f64::sin),
        ("cos", f64::cos),
        ("tan", f64::tan),
        ("asin", f64::asin),
        ("atan", f64::atan),
        ("sqrt", f64::sqrt),
        ("exp", f64::exp),
        ("log", f64::ln),
        ("floor", f64::floor),
        ("ceil", f64::ceil),
    ];

    let mut builder = ClassBuilder::new("java.lang.Math")
        .static_field("PI", "D", Slot::Double(consts::PI))
        .static_field("E", "D", Slot::Double(consts::E));

    for (name, f) in unary {
        builder = builder.static_method(name, "(D)D", move |ctx, _, args| Ok(Slot::Double(f(double_arg(ctx, args, 0)?))));
    }

    builder
        .static_method("pow", "(DD)D", |ctx, _, args| {
            Ok(Slot::Double(double_arg(ctx, args, 0)?.powf(double_arg(ctx, args, 1)?)))
        })
        .static_method("atan2", "(DD)D", |ctx, _, args| {
            Ok(Slot::Double(double_arg(ctx, args, 0)?.atan2(double_arg(ctx, args, 1)?)))
        })
        .static_method("abs", "(I)I", |ctx, _, args| Ok(Slot::Int(int_arg(ctx, args, 0)?.wrapping_abs())))
        .static_method("abs", "(J)J", |ctx, _, args| Ok(Slot::Long(long_arg(ctx, args, 0)?.wrapping_abs())))
        .static_method("abs", "(F)F", |ctx, _, args| Ok(Slot::Float(float_arg(ctx, args, 0)?.abs())))
        .static_method("abs", "(D)D", |ctx, _, args| Ok(Slot::Double(double_arg(ctx, args, 0)?.abs())))
        .static_method("max", "(II)I", |ctx, _, args| Ok(Slot::Int(int_arg(ctx, args, 0)?.max(int_arg(ctx, args, 1)?))))
        .static_method("max", "(JJ)J", |ctx, _, args| Ok(Slot::Long(long_arg(ctx, args, 0)?.max(long_arg(ctx, args, 1)?))))
        .static_method("max", "(FF)F", |ctx, _, args| Ok(Slot::Float(float_arg(ctx, args, 0)?.max(float_arg(ctx, args, 1)?))))
        .static_method("max", "(DD)D", |ctx, _, args| Ok(Slot::Double(double_arg(ctx, args, 0)?.max(double_arg(ctx, args, 1)?))))
        .static_method("min", "(II)I", |ctx, _, args| Ok(Slot::Int(int_arg(ctx, args, 0)?.min(int_arg(ctx, args, 1)?))))
        .static_method("min", "(JJ)J", |ctx, _, args| Ok(Slot::Long(long_arg(ctx, args, 0)?.min(long_arg(ctx, args, 1)?))))
        .static_method("min", "(FF)F", |ctx, _, args| Ok(Slot::Float(float_arg(ctx, args, 0)?.min(float_arg(ctx, args, 1)?))))
        .static_method("min", "(DD)D", |ctx, _, args| Ok(Slot::Double(double_arg(ctx, args, 0)?.min(double_arg(ctx, args, 1)?))))
        .static_method("round", "(D)J", |ctx, _, args| Ok(Slot::Long((double_arg(ctx, args, 0)? + 0.5).floor() as i64)))
        .static_method("round", "(F)I", |ctx, _, args| Ok(Slot::Int((float_arg(ctx, args, 0)? + 0.5).floor() as i32)))
        .static_method("floorMod", "(II)I", |ctx, _, args| {
            let (a, b) = (int_arg(ctx, args, 0)?, int_arg(ctx, args, 1)?);
            if b == 0 {
                return Err(ctx.throw("java.lang.ArithmeticException", Some("/ by zero")));
            }
            Ok(Slot::Int(((a % b) + b) % b))
        })
}

fn system() -> ClassBuilder {
    ClassBuilder::new("java.lang.System")
        .static_method("getProperty", "(Ljava/lang/String;)Ljava/lang/String;", |ctx, _, args| {
            let key = ctx.string(arg(args, 0))?;
            Ok(match ctx.property(&key).map(str::to_string) {
                Some(value) => string_slot(ctx, &value),
                None => Slot::Null,
            })
        })
        .static_method(
            "getProperty",
            "(Ljava/lang/String;Ljava/lang/String;)Ljava/lang/String;",
            |ctx, _, args| {
                let key = ctx.string(arg(args, 0))?;
                match ctx.property(&key).map(str::to_string) {
                    Some(value) => Ok(string_slot(ctx, &value)),
                    None => Ok(arg(args, 1)),
                }
            },
        )
        .static_method("identityHashCode", "(Ljava/lang/Object;)I", |ctx, _, args| {
            Ok(Slot::Int(match arg(args, 0) {
                Slot::Ref(obj) => identity_hash(obj),
                _ => 0,
            }))
        })
        .static_method("lineSeparator", "()Ljava/lang/String;", |ctx, _, _| Ok(string_slot(ctx, "\n")))
}

fn reflected_member(name: &str) -> ClassBuilder {
    ClassBuilder::new(name).method("getName", "()Ljava/lang/String;", |ctx, this, _| {
        let me = receiver(ctx, this)?;
        let member = ctx.member_name(me).map(str::to_string);
        match member {
            Some(member) => Ok(string_slot(ctx, &member)),
            None => Err(ctx.illegal_argument("not a reflected member")),
        }
    })
}
