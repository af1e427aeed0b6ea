//! End-to-end behaviour against the in-process runtime: static calls,
//! overload failures, field access, missing attributes and identity.

mod common;

use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

use xenobind::Attribute;
use xenobind::Error;
use xenobind::MatchFailure;
use xenobind::Value;

use common::object;
use common::setup;

// --- Static calls ---

#[test]
fn test_static_method_call() {
    let (_vm, session) = setup();
    let math = session.get_class("java.lang.Math").expect("Math");
    let result = math.call("sin", &[Value::Double(FRAC_PI_2)]).expect("sin");
    match result {
        Value::Double(v) => assert!((v - 1.0).abs() < 1e-12, "sin(pi/2) = {}", v),
        other => panic!("Expected Double, got {:?}", other),
    }

    // int widens to double
    let result = math.call("sqrt", &[Value::Int(16)]).expect("sqrt");
    assert_eq!(result, Value::Double(4.0));
}

#[test]
fn test_wrong_arity_has_no_matching_overload() {
    let (_vm, session) = setup();
    let math = session.get_class("java.lang.Math").expect("Math");

    for args in [vec![Value::Int(4), Value::Int(2)], vec![]] {
        let err = math.call("sin", &args).unwrap_err();
        match err {
            Error::NoMatchingOverload { class, method, failure, .. } => {
                assert_eq!(class, "java.lang.Math");
                assert_eq!(method, "sin");
                assert_eq!(failure, MatchFailure::NoCandidates);
            }
            _ => panic!("Expected NoMatchingOverload, got {:?}", err),
        }
    }
}

#[test]
fn test_static_field_read() {
    let (_vm, session) = setup();
    let integer = session.get_class("java.lang.Integer").expect("Integer");
    assert_eq!(integer.get_field("SIZE").expect("SIZE"), Value::Int(32));
    match integer.lookup("MAX_VALUE").expect("lookup") {
        Attribute::Field(v) => assert_eq!(v, Value::Int(i32::MAX)),
        other => panic!("Expected Field, got {:?}", other),
    }
}

// --- Constructors and instance calls ---

#[test]
fn test_constructor_dispatch() {
    let (_vm, session) = setup();
    let vector = session.get_class("java.util.Vector").expect("Vector");

    let v = object(vector.new_instance(&[Value::Int(10)]).expect("new Vector(10)"));
    assert_eq!(v.call("capacity", &[]).expect("capacity"), Value::Int(10));

    let v = object(vector.new_instance(&[]).expect("new Vector()"));
    assert_eq!(v.call("size", &[]).expect("size"), Value::Int(0));
}

#[test]
fn test_collections_empty_list() {
    let (_vm, session) = setup();
    let collections = session.get_class("java.util.Collections").expect("Collections");

    let empty = object(collections.call("emptyList", &[]).expect("emptyList"));
    assert_eq!(empty.call("size", &[]).expect("size"), Value::Int(0));

    let constant = object(collections.get_field("EMPTY_LIST").expect("EMPTY_LIST"));
    assert!(constant.is_same(&empty).expect("identity"));
    assert_eq!(constant.call("isEmpty", &[]).expect("isEmpty"), Value::Boolean(true));

    let err = constant.call("add", &[Value::Int(1)]).unwrap_err();
    match err {
        Error::ForeignException { class, .. } => assert_eq!(class, "java.lang.UnsupportedOperationException"),
        _ => panic!("Expected ForeignException, got {:?}", err),
    }
}

// --- Fields ---

#[test]
fn test_instance_field_read_and_write() {
    let (_vm, session) = setup();
    let dimension = session.get_class("java.awt.Dimension").expect("Dimension");
    let d = object(dimension.new_instance(&[]).expect("new Dimension()"));

    assert_eq!(d.get_field("width").expect("width"), Value::Int(0));
    d.set_field("width", 42).expect("write width");
    assert_eq!(d.get_field("width").expect("width"), Value::Int(42));
    assert_eq!(d.call("getWidth", &[]).expect("getWidth"), Value::Double(42.0));

    let err = d.set_field("width", "wide").unwrap_err();
    match err {
        Error::TypeError { expected, found } => {
            assert_eq!(expected, "int");
            assert_eq!(found, "str");
        }
        _ => panic!("Expected TypeError, got {:?}", err),
    }
    let err = d.set_field("width", 1.5).unwrap_err();
    assert!(matches!(err, Error::TypeError { .. }), "got {:?}", err);
    assert_eq!(d.get_field("width").expect("width"), Value::Int(42));
}

// --- Missing attributes ---

#[test]
fn test_missing_attribute_invokes_nothing() {
    let (vm, session) = setup();
    let dimension = session.get_class("java.awt.Dimension").expect("Dimension");
    let d = object(dimension.new_instance(&[]).expect("new Dimension()"));

    let before = vm.invocations();
    assert!(matches!(d.lookup("nonexistent").expect("lookup"), Attribute::NotFound));
    let err = d.getattr("nonexistent").unwrap_err();
    match err {
        Error::AttributeNotFound { class, name } => {
            assert_eq!(class, "java.awt.Dimension");
            assert_eq!(name, "nonexistent");
        }
        _ => panic!("Expected AttributeNotFound, got {:?}", err),
    }
    let err = dimension.call("nonexistent", &[]).unwrap_err();
    assert!(matches!(err, Error::AttributeNotFound { .. }), "got {:?}", err);
    assert_eq!(vm.invocations(), before);
}

#[test]
fn test_unknown_class_is_not_cached() {
    let (_vm, session) = setup();
    let cached = session.cache().len();

    let err = session.get_class("com.example.Missing").unwrap_err();
    match err {
        Error::ClassNotFound(name) => assert_eq!(name, "com.example.Missing"),
        _ => panic!("Expected ClassNotFound, got {:?}", err),
    }
    assert!(!session.cache().is_cached("com.example.Missing"));
    assert_eq!(session.cache().len(), cached);

    let err = session.get_class("com/example/Missing").unwrap_err();
    assert!(matches!(err, Error::ClassNotFound(_)), "got {:?}", err);
}

#[test]
fn test_describe_is_idempotent() {
    let (_vm, session) = setup();
    let first = session.describe("java.lang.String").expect("describe");
    let second = session.describe("java/lang/String").expect("describe again");
    assert!(Arc::ptr_eq(&first, &second));
    assert!(session.cache().is_cached("java.lang.String"));
    // The superclass is described along the way.
    assert!(session.cache().is_cached("java.lang.Object"));
}

// --- Identity ---

#[test]
fn test_equal_instances_are_not_identical() {
    let (_vm, session) = setup();
    let dimension = session.get_class("java.awt.Dimension").expect("Dimension");
    let a = object(dimension.new_instance(&[]).expect("first"));
    let b = object(dimension.new_instance(&[]).expect("second"));

    assert_eq!(a.call("equals", &[Value::Object(b.clone())]).expect("equals"), Value::Boolean(true));
    assert!(!a.is_same(&b).expect("identity"));
    assert_ne!(a, b);
    assert!(a.is_same(&a.clone()).expect("identity"));
}

#[test]
fn test_same_object_returned_twice_is_identical() {
    let (_vm, session) = setup();
    let factory = session.get_class("demo.ObjFactory").expect("ObjFactory");
    let a = object(factory.call("makeObject", &[Value::Int(2)]).expect("first"));
    let b = object(factory.call("makeObject", &[Value::Int(2)]).expect("second"));

    assert_ne!(a.handle().key(), b.handle().key());
    assert!(a.is_same(&b).expect("identity"));
    assert_eq!(a, b);
}
