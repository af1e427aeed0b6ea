use std::sync::Arc;
use std::thread;

use xenoabi::FieldTarget;
use xenoabi::ForeignError;
use xenoabi::ForeignRuntime;
use xenoabi::ForeignValue;
use xenoabi::Launcher;
use xenoabi::MethodId;
use xenoabi::RawRef;
use xenoabi::RefKind;
use xenoabi::sig::parse_method_descriptor;

use crate::ClassBuilder;
use crate::DefineError;
use crate::Slot;
use crate::Vm;
use crate::VmLauncher;
use crate::VmOptions;

fn vm() -> Vm {
    Vm::new().expect("standard library defines cleanly")
}

fn class(vm: &Vm, name: &str) -> RawRef {
    vm.find_class(name).expect("find_class").expect("class exists")
}

/// Finds a method or constructor id by name and descriptor, releasing the reflected refs.
fn method(vm: &Vm, class: RawRef, name: &str, descriptor: &str) -> MethodId {
    let (params, ret) = parse_method_descriptor(descriptor).expect("descriptor");
    let refs = if name == "<init>" {
        vm.declared_constructors(class).expect("constructors")
    } else {
        vm.declared_methods(class).expect("methods")
    };
    let mut found = None;
    for r in refs {
        let info = vm.method_info(r).expect("method info");
        if info.name == name && info.params == params && (name == "<init>" || info.ret == ret) {
            found = Some(info.id);
        }
        vm.delete_ref(r).expect("delete reflected ref");
    }
    found.unwrap_or_else(|| panic!("no method {}{}", name, descriptor))
}

fn string(vm: &Vm, s: &str) -> RawRef {
    let units: Vec<u16> = s.encode_utf16().collect();
    vm.new_string(&units).expect("new_string")
}

fn read_string(vm: &Vm, value: ForeignValue) -> String {
    match value {
        ForeignValue::Ref(Some(r)) => {
            let units = vm.string_utf16(r).expect("string contents");
            vm.delete_ref(r).expect("delete");
            String::from_utf16(&units).expect("utf-16")
        }
        other => panic!("Expected string ref, got {:?}", other),
    }
}

// --- Classes and reflection ---

#[test]
fn test_find_class_accepts_both_name_forms() {
    let vm = vm();
    let dotted = class(&vm, "java.lang.String");
    let slashed = class(&vm, "java/lang/String");
    assert!(vm.is_same_object(dotted, slashed).expect("identity"));
    assert_eq!(vm.class_name(dotted).expect("name"), "java.lang.String");
    assert!(vm.find_class("no.such.Thing").expect("lookup").is_none());
}

#[test]
fn test_hierarchy_queries() {
    let vm = vm();
    let integer = class(&vm, "java.lang.Integer");
    let number = vm.superclass(integer).expect("superclass").expect("has superclass");
    assert_eq!(vm.class_name(number).expect("name"), "java.lang.Number");

    let list = class(&vm, "java.util.List");
    assert!(vm.is_interface(list).expect("is_interface"));
    assert!(vm.superclass(list).expect("superclass").is_none());
    let supers = vm.interfaces(list).expect("interfaces");
    assert_eq!(supers.len(), 1);
    assert_eq!(vm.class_name(supers[0]).expect("name"), "java.util.Collection");

    let object = class(&vm, "java.lang.Object");
    assert!(vm.superclass(object).expect("superclass").is_none());
}

#[test]
fn test_ref_kinds() {
    let vm = vm();
    let math = class(&vm, "java.lang.Math");
    assert_eq!(vm.ref_kind(math).expect("kind"), RefKind::Class);
    let methods = vm.declared_methods(math).expect("methods");
    assert_eq!(vm.ref_kind(methods[0]).expect("kind"), RefKind::Method);
    let fields = vm.declared_fields(math).expect("fields");
    assert_eq!(vm.ref_kind(fields[0]).expect("kind"), RefKind::Field);
    let s = string(&vm, "x");
    assert_eq!(vm.ref_kind(s).expect("kind"), RefKind::Instance);

    let string_class = vm.object_class(s).expect("class");
    assert_eq!(vm.class_name(string_class).expect("name"), "java.lang.String");
    let meta = vm.object_class(string_class).expect("class of class");
    assert_eq!(vm.class_name(meta).expect("name"), "java.lang.Class");
}

// --- Invocation ---

#[test]
fn test_static_call() {
    let vm = vm();
    let math = class(&vm, "java.lang.Math");
    let sin = method(&vm, math, "sin", "(D)D");
    let result = vm.call_static(math, sin, &[ForeignValue::Double(std::f64::consts::FRAC_PI_2)]).expect("sin");
    assert_eq!(result, ForeignValue::Double(1.0));

    let max = method(&vm, math, "max", "(JJ)J");
    let result = vm.call_static(math, max, &[ForeignValue::Long(3), ForeignValue::Long(-9)]).expect("max");
    assert_eq!(result, ForeignValue::Long(3));
}

#[test]
fn test_arguments_are_checked() {
    let vm = vm();
    let math = class(&vm, "java.lang.Math");
    let sin = method(&vm, math, "sin", "(D)D");

    let err = vm.call_static(math, sin, &[ForeignValue::Int(1)]).unwrap_err();
    match err {
        ForeignError::BadArguments(_) => {}
        _ => panic!("Expected BadArguments, got {:?}", err),
    }
    let err = vm.call_static(math, sin, &[]).unwrap_err();
    assert!(matches!(err, ForeignError::BadArguments(_)), "got {:?}", err);

    let err = vm.call_static(math, MethodId(u64::MAX), &[]).unwrap_err();
    assert!(matches!(err, ForeignError::InvalidMethod(_)), "got {:?}", err);
}

#[test]
fn test_virtual_dispatch_uses_dynamic_class() {
    let vm = vm();
    let object = class(&vm, "java.lang.Object");
    let to_string = method(&vm, object, "toString", "()Ljava/lang/String;");

    let list_class = class(&vm, "java.util.ArrayList");
    let ctor = method(&vm, list_class, "<init>", "()V");
    let list = vm.new_object(list_class, ctor, &[]).expect("new ArrayList");

    let collection = class(&vm, "java.util.Collection");
    let add = method(&vm, collection, "add", "(Ljava/lang/Object;)Z");
    let item = string(&vm, "a");
    let added = vm.call_method(list, add, &[ForeignValue::Ref(Some(item))]).expect("add");
    assert_eq!(added, ForeignValue::Boolean(true));

    let text = vm.call_method(list, to_string, &[]).expect("toString");
    assert_eq!(read_string(&vm, text), "[a]");
}

#[test]
fn test_receiver_must_match_declaring_class() {
    let vm = vm();
    let string_class = class(&vm, "java.lang.String");
    let length = method(&vm, string_class, "length", "()I");
    let dimension = class(&vm, "java.awt.Dimension");
    let ctor = method(&vm, dimension, "<init>", "()V");
    let d = vm.new_object(dimension, ctor, &[]).expect("new Dimension");

    let err = vm.call_method(d, length, &[]).unwrap_err();
    assert!(matches!(err, ForeignError::BadArguments(_)), "got {:?}", err);
}

#[test]
fn test_exceptions_surface_as_thrown_refs() {
    let vm = vm();
    let string_class = class(&vm, "java.lang.String");
    let char_at = method(&vm, string_class, "charAt", "(I)C");
    let s = string(&vm, "ab");

    let err = vm.call_method(s, char_at, &[ForeignValue::Int(5)]).unwrap_err();
    let ForeignError::Thrown(exc) = err else {
        panic!("Expected Thrown, got {:?}", err);
    };
    let exc_class = vm.object_class(exc).expect("exception class");
    assert_eq!(vm.class_name(exc_class).expect("name"), "java.lang.StringIndexOutOfBoundsException");

    let throwable = class(&vm, "java.lang.Throwable");
    let get_message = method(&vm, throwable, "getMessage", "()Ljava/lang/String;");
    let message = vm.call_method(exc, get_message, &[]).expect("getMessage");
    assert_eq!(read_string(&vm, message), "index 5 out of bounds for length 2");
}

#[test]
fn test_abstract_classes_cannot_be_instantiated() {
    let vm = vm();
    let number = class(&vm, "java.lang.Number");
    let ctor = method(&vm, number, "<init>", "()V");
    let err = vm.new_object(number, ctor, &[]).unwrap_err();
    assert!(matches!(err, ForeignError::Thrown(_)), "got {:?}", err);
}

// --- Fields ---

#[test]
fn test_fields_default_and_update() {
    let vm = vm();
    let dimension = class(&vm, "java.awt.Dimension");
    let ctor = method(&vm, dimension, "<init>", "()V");
    let d = vm.new_object(dimension, ctor, &[]).expect("new Dimension");

    let fields = vm.declared_fields(dimension).expect("fields");
    let width = fields
        .iter()
        .map(|f| vm.field_info(*f).expect("field info"))
        .find(|info| info.name == "width")
        .expect("width field");

    let target = FieldTarget::Instance(d);
    assert_eq!(vm.get_field(target, width.id).expect("get"), ForeignValue::Int(0));
    vm.set_field(target, width.id, ForeignValue::Int(42)).expect("set");
    assert_eq!(vm.get_field(target, width.id).expect("get"), ForeignValue::Int(42));

    let err = vm.set_field(target, width.id, ForeignValue::Double(1.5)).unwrap_err();
    assert!(matches!(err, ForeignError::BadArguments(_)), "got {:?}", err);
    assert_eq!(vm.get_field(target, width.id).expect("get"), ForeignValue::Int(42));
}

#[test]
fn test_static_field_initializers() {
    let vm = vm();
    let integer = class(&vm, "java.lang.Integer");
    let fields = vm.declared_fields(integer).expect("fields");
    let size = fields
        .iter()
        .map(|f| vm.field_info(*f).expect("field info"))
        .find(|info| info.name == "SIZE")
        .expect("SIZE field");
    assert!(size.is_static);
    assert_eq!(vm.get_field(FieldTarget::Static(integer), size.id).expect("get"), ForeignValue::Int(32));
}

// --- Strings and references ---

#[test]
fn test_strings_keep_every_code_unit() {
    let vm = vm();
    let text = "nul\0 astral \u{1F600} hebrew \u{05D0}";
    let s = string(&vm, text);
    let units = vm.string_utf16(s).expect("contents");
    assert_eq!(String::from_utf16(&units).expect("utf-16"), text);

    let lone: [u16; 2] = [0x61, 0xD800];
    let s = vm.new_string(&lone).expect("new_string");
    assert_eq!(vm.string_utf16(s).expect("contents"), lone);
}

#[test]
fn test_reference_table_accounting() {
    let vm = vm();
    let base = vm.live_refs();
    let s = string(&vm, "x");
    let copy = vm.new_ref(s).expect("new_ref");
    assert_eq!(vm.live_refs(), base + 2);
    assert!(vm.is_same_object(s, copy).expect("identity"));

    vm.delete_ref(s).expect("delete");
    vm.delete_ref(copy).expect("delete");
    assert_eq!(vm.live_refs(), base);
    assert_eq!(vm.delete_ref(s), Err(ForeignError::InvalidRef(s)));
}

#[test]
fn test_unreferenced_objects_are_collected() {
    let vm = vm();
    let array_list = class(&vm, "java.util.ArrayList");
    let abstract_list = class(&vm, "java.util.AbstractList");
    let init = method(&vm, array_list, "<init>", "()V");
    let add = method(&vm, abstract_list, "add", "(Ljava/lang/Object;)Z");
    let get = method(&vm, abstract_list, "get", "(I)Ljava/lang/Object;");
    // Reflection above left garbage behind.
    assert!(vm.collect_garbage() > 0);
    let baseline = vm.live_objects();

    let list = vm.new_object(array_list, init, &[]).expect("new ArrayList()");
    for text in ["kept", "also kept"] {
        let s = string(&vm, text);
        vm.call_method(list, add, &[ForeignValue::Ref(Some(s))]).expect("add");
        vm.delete_ref(s).expect("delete");
    }
    for _ in 0..10 {
        let s = string(&vm, "garbage");
        vm.delete_ref(s).expect("delete");
    }

    // The list and both elements survive; the rest goes.
    assert_eq!(vm.collect_garbage(), 10);
    assert_eq!(vm.live_objects(), baseline + 3);
    let first = vm.call_method(list, get, &[ForeignValue::Int(0)]).expect("get");
    assert_eq!(read_string(&vm, first), "kept");

    vm.delete_ref(list).expect("delete");
    assert_eq!(vm.collect_garbage(), 3);
    assert_eq!(vm.live_objects(), baseline);

    // Objects held only by statics survive.
    let collections = class(&vm, "java.util.Collections");
    let empty = method(&vm, collections, "emptyList", "()Ljava/util/List;");
    match vm.call_static(collections, empty, &[]).expect("emptyList") {
        ForeignValue::Ref(Some(r)) => assert_eq!(vm.class_name(vm.object_class(r).expect("class")).expect("name"), "java.util.Collections$EmptyList"),
        other => panic!("Expected a list, got {:?}", other),
    }
}

// --- Threads ---

#[test]
fn test_unattached_threads_are_refused() {
    let vm = Arc::new(vm());
    let s = string(&vm, "x");

    let worker = Arc::clone(&vm);
    thread::spawn(move || {
        assert_eq!(worker.find_class("java.lang.Object"), Err(ForeignError::NotAttached));
        assert!(worker.is_same_object(s, s).expect("identity works unattached"));

        assert!(worker.attach_current_thread().expect("attach"));
        assert!(!worker.attach_current_thread().expect("attach again"));
        assert!(worker.find_class("java.lang.Object").expect("lookup").is_some());
        worker.detach_current_thread().expect("detach");
        assert_eq!(worker.find_class("java.lang.Object"), Err(ForeignError::NotAttached));

        worker.delete_ref(s).expect("delete works unattached");
    })
    .join()
    .expect("worker thread");
}

// --- Definitions and options ---

#[test]
fn test_define_rejects_bad_classes() {
    let vm = vm();
    let err = vm.define(ClassBuilder::new("java.lang.String")).unwrap_err();
    assert!(matches!(err, DefineError::Duplicate(_)), "got {:?}", err);

    let err = vm.define(ClassBuilder::new("demo.Orphan").extends("demo.Missing")).unwrap_err();
    assert!(matches!(err, DefineError::UnknownClass { .. }), "got {:?}", err);

    let err = vm
        .define(ClassBuilder::new("demo.Broken").static_method("f", "(I", |_, _, _| Ok(Slot::Void)))
        .unwrap_err();
    assert!(matches!(err, DefineError::Descriptor { .. }), "got {:?}", err);

    let err = vm.define(ClassBuilder::new("demo.BadInit").static_field("x", "I", Slot::Double(1.0))).unwrap_err();
    assert!(matches!(err, DefineError::BadInitializer { .. }), "got {:?}", err);
}

#[test]
fn test_options_parse() {
    let options = VmOptions::parse(&[
        "-Dlang=rust".to_string(),
        "-Dflag".to_string(),
        "-verbose:class".to_string(),
        "-Xmx64m".to_string(),
    ]);
    assert_eq!(options.properties.get("lang").map(String::as_str), Some("rust"));
    assert_eq!(options.properties.get("flag").map(String::as_str), Some(""));
    assert!(options.verbose_class);
    assert_eq!(options.ignored, vec!["-Xmx64m".to_string()]);
}

#[test]
fn test_launcher_requires_library_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let missing = dir.path().join("libruntime.so");
    let err = VmLauncher::new().launch(&missing, &[]).err().expect("launch should fail");
    assert!(matches!(err, xenoabi::LaunchError::LibraryNotFound(_)), "got {:?}", err);

    std::fs::write(&missing, b"").expect("create library file");
    let runtime = VmLauncher::new()
        .with_class(ClassBuilder::new("demo.Extra"))
        .launch(&missing, &["-Dk=v".to_string()])
        .expect("launch");
    assert!(runtime.find_class("demo.Extra").expect("lookup").is_some());
}

#[test]
fn test_invocations_are_counted() {
    let vm = vm();
    let math = class(&vm, "java.lang.Math");
    let abs = method(&vm, math, "abs", "(I)I");
    let before = vm.invocations();
    vm.call_static(math, abs, &[ForeignValue::Int(-4)]).expect("abs");
    assert_eq!(vm.invocations(), before + 1);
}
