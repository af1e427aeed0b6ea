//! `java.awt.Dimension`, a plain mutable value class with public fields.

use crate::class::ClassBuilder;
use crate::class::DefineError;
use crate::heap::Slot;
use crate::vm::State;

use super::arg;
use super::receiver;
use super::string_slot;

pub(crate) fn install(state: &mut State) -> Result<(), DefineError> {
    state.define(
        ClassBuilder::new("java.awt.geom.Dimension2D")
            .abstract_class()
            .constructor("()V", |_, _, _| Ok(Slot::Void))
            .abstract_method("getWidth", "()D")
            .abstract_method("getHeight", "()D")
            .abstract_method("setSize", "(DD)V"),
    )?;

    state.define(
        ClassBuilder::new("java.awt.Dimension")
            .extends("java.awt.geom.Dimension2D")
            .field("width", "I")
            .field("height", "I")
            .constructor("()V", |_, _, _| Ok(Slot::Void))
            .constructor("(II)V", |ctx, this, args| {
                let me = receiver(ctx, this)?;
                ctx.set_field(me, "width", arg(args, 0))?;
                ctx.set_field(me, "height", arg(args, 1))?;
                Ok(Slot::Void)
            })
            .constructor("(Ljava/awt/Dimension;)V", |ctx, this, args| {
                let me = receiver(ctx, this)?;
                let Slot::Ref(other) = arg(args, 0) else {
                    return Err(ctx.null_pointer());
                };
                let width = ctx.field(other, "width")?;
                let height = ctx.field(other, "height")?;
                ctx.set_field(me, "width", width)?;
                ctx.set_field(me, "height", height)?;
                Ok(Slot::Void)
            })
            .method("getWidth", "()D", |ctx, this, _| {
                let me = receiver(ctx, this)?;
                Ok(match ctx.field(me, "width")? {
                    Slot::Int(w) => Slot::Double(w as f64),
                    other => other,
                })
            })
            .method("getHeight", "()D", |ctx, this, _| {
                let me = receiver(ctx, this)?;
                Ok(match ctx.field(me, "height")? {
                    Slot::Int(h) => Slot::Double(h as f64),
                    other => other,
                })
            })
            .method("setSize", "(II)V", |ctx, this, args| {
                let me = receiver(ctx, this)?;
                ctx.set_field(me, "width", arg(args, 0))?;
                ctx.set_field(me, "height", arg(args, 1))?;
                Ok(Slot::Void)
            })
            .method("setSize", "(DD)V", |ctx, this, args| {
                let me = receiver(ctx, this)?;
                let round = |slot: Slot| match slot {
                    Slot::Double(v) => Slot::Int(v.ceil() as i32),
                    other => other,
                };
                ctx.set_field(me, "width", round(arg(args, 0)))?;
                ctx.set_field(me, "height", round(arg(args, 1)))?;
                Ok(Slot::Void)
            })
            .method("equals", "(Ljava/lang/Object;)Z", |ctx, this, args| {
                let me = receiver(ctx, this)?;
                let equal = match arg(args, 0) {
                    Slot::Ref(other) if ctx.is_instance(other, "java.awt.Dimension") => {
                        ctx.field(me, "width")? == ctx.field(other, "width")?
                            && ctx.field(me, "height")? == ctx.field(other, "height")?
                    }
                    _ => false,
                };
                Ok(Slot::Boolean(equal))
            })
            .method("toString", "()Ljava/lang/String;", |ctx, this, _| {
                let me = receiver(ctx, this)?;
                let width = ctx.field(me, "width")?;
                let height = ctx.field(me, "height")?;
                let text = format!("java.awt.Dimension[width={},height={}]", ctx.display(width)?, ctx.display(height)?);
                Ok(string_slot(ctx, &text))
            }),
    )?;
    Ok(())
}
