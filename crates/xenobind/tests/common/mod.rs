//! Fixture classes and session setup shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use xenobind::Session;
use xenobind::Value;
use xenovm::ClassBuilder;
use xenovm::Slot;
use xenovm::Vm;

/// Installs a test subscriber once; `RUST_LOG` controls the output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A runtime with the standard library plus the fixture classes, and a
/// session over it. The calling thread is attached.
pub fn setup() -> (Arc<Vm>, Session) {
    init_tracing();
    let vm = Vm::new().expect("Failed to create runtime");
    for class in fixture_classes() {
        vm.define(class).expect("Failed to define fixture class");
    }
    let vm = Arc::new(vm);
    let session = Session::new(vm.clone());
    (vm, session)
}

pub fn fixture_classes() -> Vec<ClassBuilder> {
    vec![obj_factory(), set_field(), overloads(), thrower(), base(), derived(), echo()]
}

/// Hands out one shared object, however often it is asked.
fn obj_factory() -> ClassBuilder {
    ClassBuilder::new("demo.ObjFactory")
        .static_field("shared", "Ljava/lang/Object;", Slot::Null)
        .static_method("makeObject", "(I)Ljava/lang/Object;", |ctx, _, _| {
            let current = ctx.static_field("demo.ObjFactory", "shared")?;
            if current != Slot::Null {
                return Ok(current);
            }
            let made = Slot::Ref(ctx.construct("java.lang.Object", "()V", &[])?);
            ctx.set_static_field("demo.ObjFactory", "shared", made)?;
            Ok(made)
        })
}

fn set_field() -> ClassBuilder {
    ClassBuilder::new("demo.SetField")
        .static_field("a", "I", Slot::Int(0))
        .static_field("b", "Ljava/lang/String;", Slot::Null)
        .field("c", "I")
        .field("d", "Ljava/lang/String;")
        .constructor("()V", |_, _, _| Ok(Slot::Void))
}

fn overloads() -> ClassBuilder {
    fn tag(text: &'static str) -> impl Fn(&mut xenovm::Ctx<'_>, Option<xenovm::ObjId>, &[Slot]) -> Result<Slot, xenovm::Throw> {
        move |ctx, _, _| Ok(Slot::Ref(ctx.new_string(text)))
    }

    ClassBuilder::new("demo.Overloads")
        .static_method("g", "(JD)Ljava/lang/String;", tag("JD"))
        .static_method("g", "(DJ)Ljava/lang/String;", tag("DJ"))
        .static_method("describe", "(I)Ljava/lang/String;", tag("int"))
        .static_method("describe", "(J)Ljava/lang/String;", tag("long"))
        .static_method("describe", "(D)Ljava/lang/String;", tag("double"))
        .static_method("describe", "(Ljava/lang/String;)Ljava/lang/String;", tag("string"))
        .static_method("describe", "(Ljava/lang/Object;)Ljava/lang/String;", tag("object"))
}

fn thrower() -> ClassBuilder {
    ClassBuilder::new("demo.Thrower")
        .static_method("fail", "(Ljava/lang/String;)V", |ctx, _, args| {
            let message = ctx.string(args[0])?;
            Err(ctx.throw("java.lang.IllegalStateException", Some(&message)))
        })
        .static_method("failQuietly", "()V", |ctx, _, _| Err(ctx.throw("java.lang.RuntimeException", None)))
        .static_method("refuse", "(I)Ljava/lang/Integer;", |ctx, _, _| {
            Err(ctx.throw("java.lang.IllegalStateException", Some("no boxes today")))
        })
        .static_method("failGarbled", "()V", |ctx, _, _| {
            let message = Slot::Ref(ctx.new_string_utf16(vec![0x62, 0x61, 0x64, 0xD800]));
            let exception = ctx.construct("java.lang.IllegalStateException", "(Ljava/lang/String;)V", &[message])?;
            Err(xenovm::Throw(exception))
        })
}

fn base() -> ClassBuilder {
    ClassBuilder::new("demo.Base")
        .static_field("KIND", "I", Slot::Int(1))
        .field("count", "I")
        .constructor("()V", |_, _, _| Ok(Slot::Void))
        .method("name", "()Ljava/lang/String;", |ctx, _, _| Ok(Slot::Ref(ctx.new_string("base"))))
        .method("bump", "()I", |ctx, this, _| {
            let me = this.ok_or_else(|| ctx.null_pointer())?;
            let next = match ctx.field(me, "count")? {
                Slot::Int(n) => n + 1,
                _ => 1,
            };
            ctx.set_field(me, "count", Slot::Int(next))?;
            Ok(Slot::Int(next))
        })
}

fn derived() -> ClassBuilder {
    ClassBuilder::new("demo.Derived")
        .extends("demo.Base")
        .static_field("KIND", "I", Slot::Int(2))
        .constructor("()V", |_, _, _| Ok(Slot::Void))
        .method("name", "()Ljava/lang/String;", |ctx, _, _| Ok(Slot::Ref(ctx.new_string("derived"))))
}

/// Identity functions for every kind, plus strings the bridge cannot represent.
fn echo() -> ClassBuilder {
    let mut builder = ClassBuilder::new("demo.Echo");
    for descriptor in [
        "Z",
        "B",
        "C",
        "S",
        "I",
        "J",
        "F",
        "D",
        "Ljava/lang/String;",
        "Ljava/lang/Object;",
    ] {
        builder = builder.static_method("id", &format!("({}){}", descriptor, descriptor), |_, _, args| Ok(args[0]));
    }
    builder
        .static_method("loneSurrogate", "()Ljava/lang/String;", |ctx, _, _| {
            Ok(Slot::Ref(ctx.new_string_utf16(vec![0x61, 0xD800])))
        })
        .static_method("loneChar", "()C", |_, _, _| Ok(Slot::Char(0xDC00)))
}

pub fn str(value: &Value) -> &str {
    match value {
        Value::Str(s) => s,
        other => panic!("Expected Str, got {:?}", other),
    }
}

pub fn object(value: Value) -> xenobind::ProxyObject {
    match value {
        Value::Object(o) => o,
        other => panic!("Expected Object, got {:?}", other),
    }
}
