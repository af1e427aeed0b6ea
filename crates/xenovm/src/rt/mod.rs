//! The bundled class library.

use crate::class::DefineError;
use crate::heap::ObjId;
use crate::heap::Slot;
use crate::vm::Ctx;
use crate::vm::State;
use crate::vm::Throw;

mod awt;
mod boxes;
mod lang;
mod util;

pub(crate) fn install(state: &mut State) -> Result<(), DefineError> {
    lang::install(state)?;
    boxes::install(state)?;
    util::install(state)?;
    awt::install(state)?;
    Ok(())
}

/// The receiver of an instance method.
pub(crate) fn receiver(ctx: &mut Ctx<'_>, this: Option<ObjId>) -> Result<ObjId, Throw> {
    this.ok_or_else(|| ctx.null_pointer())
}

/// An argument that must be a non-null reference.
pub(crate) fn object_arg(ctx: &mut Ctx<'_>, args: &[Slot], i: usize) -> Result<ObjId, Throw> {
    match args.get(i) {
        Some(Slot::Ref(obj)) => Ok(*obj),
        Some(Slot::Null) => Err(ctx.null_pointer()),
        _ => Err(ctx.illegal_argument("expected an object argument")),
    }
}

/// An argument of any kind; a missing one reads as `Void`.
pub(crate) fn arg(args: &[Slot], i: usize) -> Slot {
    args.get(i).copied().unwrap_or(Slot::Void)
}

macro_rules! typed_arg {
    ($name:ident, $variant:ident, $ty:ty) => {
        pub(crate) fn $name(ctx: &mut Ctx<'_>, args: &[Slot], i: usize) -> Result<$ty, Throw> {
            match args.get(i) {
                Some(Slot::$variant(v)) => Ok(*v),
                _ => Err(ctx.illegal_argument(concat!("expected a ", stringify!($variant), " argument"))),
            }
        }
    };
}

typed_arg!(bool_arg, Boolean, bool);
typed_arg!(int_arg, Int, i32);
typed_arg!(long_arg, Long, i64);
typed_arg!(float_arg, Float, f32);
typed_arg!(double_arg, Double, f64);

/// Wraps a Rust string as a returned string object.
pub(crate) fn string_slot(ctx: &mut Ctx<'_>, s: &str) -> Slot {
    Slot::Ref(ctx.new_string(s))
}

pub(crate) fn identity_hash(obj: ObjId) -> i32 {
    (obj.0 as i32).wrapping_mul(0x61c8_8647)
}
