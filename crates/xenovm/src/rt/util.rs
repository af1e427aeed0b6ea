//! `java.util`: the collection interfaces, two growable lists and `Collections`.

use crate::class::ClassBuilder;
use crate::class::DefineError;
use crate::heap::ObjId;
use crate::heap::Payload;
use crate::heap::Slot;
use crate::vm::Ctx;
use crate::vm::State;
use crate::vm::Throw;

use super::arg;
use super::int_arg;
use super::receiver;
use super::string_slot;

const EMPTY_LIST: &str = "java.util.Collections$EmptyList";

pub(crate) fn install(state: &mut State) -> Result<(), DefineError> {
    state.define(
        ClassBuilder::interface("java.util.Collection")
            .abstract_method("size", "()I")
            .abstract_method("isEmpty", "()Z")
            .abstract_method("add", "(Ljava/lang/Object;)Z")
            .abstract_method("contains", "(Ljava/lang/Object;)Z"),
    )?;
    state.define(
        ClassBuilder::interface("java.util.List")
            .implements("java.util.Collection")
            .abstract_method("get", "(I)Ljava/lang/Object;")
            .abstract_method("set", "(ILjava/lang/Object;)Ljava/lang/Object;")
            .abstract_method("indexOf", "(Ljava/lang/Object;)I"),
    )?;
    state.define(abstract_list())?;
    state.define(
        ClassBuilder::new("java.util.ArrayList")
            .extends("java.util.AbstractList")
            .constructor("()V", init_list)
            .constructor("(I)V", |ctx, this, args| {
                if int_arg(ctx, args, 0)? < 0 {
                    return Err(ctx.illegal_argument("negative initial capacity"));
                }
                init_list(ctx, this, args)
            }),
    )?;
    state.define(vector())?;
    state.define(
        ClassBuilder::new(EMPTY_LIST)
            .extends("java.util.AbstractList")
            .constructor("()V", init_list)
            .method("add", "(Ljava/lang/Object;)Z", |ctx, _, _| Err(unsupported(ctx)))
            .method("set", "(ILjava/lang/Object;)Ljava/lang/Object;", |ctx, _, _| Err(unsupported(ctx))),
    )?;

    let empty = match state.lookup(EMPTY_LIST) {
        Some(id) => state.alloc_instance(id),
        None => {
            return Err(DefineError::UnknownClass {
                class: "java.util.Collections".to_string(),
                missing: EMPTY_LIST.to_string(),
            });
        }
    };
    state.heap.get_mut(empty).payload = Payload::List(Vec::new());

    state.define(
        ClassBuilder::new("java.util.Collections")
            .static_field("EMPTY_LIST", "Ljava/util/List;", Slot::Ref(empty))
            .static_method("emptyList", "()Ljava/util/List;", |ctx, _, _| {
                ctx.static_field("java.util.Collections", "EMPTY_LIST")
            })
            .static_method("singletonList", "(Ljava/lang/Object;)Ljava/util/List;", |ctx, _, args| {
                let list = ctx.construct(EMPTY_LIST, "()V", &[])?;
                if let Some(items) = ctx.list(list) {
                    items.push(arg(args, 0));
                }
                Ok(Slot::Ref(list))
            }),
    )?;
    Ok(())
}

fn init_list(ctx: &mut Ctx<'_>, this: Option<ObjId>, _: &[Slot]) -> Result<Slot, Throw> {
    let me = receiver(ctx, this)?;
    ctx.set_payload(me, Payload::List(Vec::new()));
    Ok(Slot::Void)
}

fn unsupported(ctx: &mut Ctx<'_>) -> Throw {
    ctx.throw("java.lang.UnsupportedOperationException", None)
}

/// Snapshot of the receiver's elements.
fn items(ctx: &mut Ctx<'_>, this: Option<ObjId>) -> Result<Vec<Slot>, Throw> {
    let me = receiver(ctx, this)?;
    match ctx.list(me) {
        Some(items) => Ok(items.clone()),
        None => Err(ctx.throw("java.lang.IllegalStateException", Some("list storage missing"))),
    }
}

/// Checks `index` against the receiver's length.
fn position(ctx: &mut Ctx<'_>, this: Option<ObjId>, args: &[Slot]) -> Result<(ObjId, usize), Throw> {
    let me = receiver(ctx, this)?;
    let index = int_arg(ctx, args, 0)?;
    let len = ctx.list(me).map_or(0, |items| items.len());
    match usize::try_from(index).ok().filter(|i| *i < len) {
        Some(i) => Ok((me, i)),
        None => {
            let message = format!("Index {} out of bounds for length {}", index, len);
            Err(ctx.throw("java.lang.IndexOutOfBoundsException", Some(&message)))
        }
    }
}

fn index_of(ctx: &mut Ctx<'_>, this: Option<ObjId>, needle: Slot) -> Result<i32, Throw> {
    for (i, item) in items(ctx, this)?.into_iter().enumerate() {
        let found = match needle {
            Slot::Null => item == Slot::Null,
            _ => ctx.equals(needle, item)?,
        };
        if found {
            return Ok(i as i32);
        }
    }
    Ok(-1)
}

fn abstract_list() -> ClassBuilder {
    ClassBuilder::new("java.util.AbstractList")
        .implements("java.util.List")
        .abstract_class()
        .constructor("()V", init_list)
        .method("size", "()I", |ctx, this, _| Ok(Slot::Int(items(ctx, this)?.len() as i32)))
        .method("isEmpty", "()Z", |ctx, this, _| Ok(Slot::Boolean(items(ctx, this)?.is_empty())))
        .method("add", "(Ljava/lang/Object;)Z", |ctx, this, args| {
            let me = receiver(ctx, this)?;
            if let Some(items) = ctx.list(me) {
                items.push(arg(args, 0));
            }
            Ok(Slot::Boolean(true))
        })
        .method("get", "(I)Ljava/lang/Object;", |ctx, this, args| {
            let (me, i) = position(ctx, this, args)?;
            Ok(ctx.list(me).map_or(Slot::Null, |items| items[i]))
        })
        .method("set", "(ILjava/lang/Object;)Ljava/lang/Object;", |ctx, this, args| {
            let (me, i) = position(ctx, this, args)?;
            let value = arg(args, 1);
            Ok(ctx.list(me).map_or(Slot::Null, |items| std::mem::replace(&mut items[i], value)))
        })
        .method("contains", "(Ljava/lang/Object;)Z", |ctx, this, args| {
            Ok(Slot::Boolean(index_of(ctx, this, arg(args, 0))? >= 0))
        })
        .method("indexOf", "(Ljava/lang/Object;)I", |ctx, this, args| Ok(Slot::Int(index_of(ctx, this, arg(args, 0))?)))
        .method("toString", "()Ljava/lang/String;", |ctx, this, _| {
            let mut parts = Vec::new();
            for item in items(ctx, this)? {
                parts.push(ctx.display(item)?);
            }
            let text = format!("[{}]", parts.join(", "));
            Ok(string_slot(ctx, &text))
        })
        .method("equals", "(Ljava/lang/Object;)Z", |ctx, this, args| {
            let mine = items(ctx, this)?;
            let Slot::Ref(other) = arg(args, 0) else {
                return Ok(Slot::Boolean(false));
            };
            let Some(theirs) = ctx.list(other).map(|items| items.clone()) else {
                return Ok(Slot::Boolean(false));
            };
            if mine.len() != theirs.len() {
                return Ok(Slot::Boolean(false));
            }
            for (a, b) in mine.into_iter().zip(theirs) {
                if !ctx.equals(a, b)? {
                    return Ok(Slot::Boolean(false));
                }
            }
            Ok(Slot::Boolean(true))
        })
}

fn vector() -> ClassBuilder {
    fn init(ctx: &mut Ctx<'_>, this: Option<ObjId>, capacity: i32) -> Result<Slot, Throw> {
        if capacity < 0 {
            return Err(ctx.illegal_argument(&format!("Illegal Capacity: {}", capacity)));
        }
        let me = receiver(ctx, this)?;
        ctx.set_payload(me, Payload::List(Vec::new()));
        ctx.set_field(me, "capacity", Slot::Int(capacity))?;
        Ok(Slot::Void)
    }

    ClassBuilder::new("java.util.Vector")
        .extends("java.util.AbstractList")
        .field("capacity", "I")
        .constructor("()V", |ctx, this, _| init(ctx, this, 10))
        .constructor("(I)V", |ctx, this, args| {
            let capacity = int_arg(ctx, args, 0)?;
            init(ctx, this, capacity)
        })
        .method("capacity", "()I", |ctx, this, _| {
            let me = receiver(ctx, this)?;
            ctx.field(me, "capacity")
        })
        .method("add", "(Ljava/lang/Object;)Z", |ctx, this, args| {
            let me = receiver(ctx, this)?;
            let len = match ctx.list(me) {
                Some(items) => {
                    items.push(arg(args, 0));
                    items.len() as i32
                }
                None => 0,
            };
            if let Slot::Int(capacity) = ctx.field(me, "capacity")? {
                if len > capacity {
                    ctx.set_field(me, "capacity", Slot::Int((capacity * 2).max(len)))?;
                }
            }
            Ok(Slot::Boolean(true))
        })
        .method("elementAt", "(I)Ljava/lang/Object;", |ctx, this, args| {
            let (me, i) = position(ctx, this, args)?;
            Ok(ctx.list(me).map_or(Slot::Null, |items| items[i]))
        })
}
