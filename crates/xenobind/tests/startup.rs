//! The process-wide runtime. Kept to a single test: `start` may succeed only
//! once per process.

mod common;

use std::fs;

use xenobind::Error;
use xenobind::StartConfig;
use xenobind::Value;
use xenovm::VmLauncher;

use common::str;

#[test]
fn test_start_once_per_process() {
    common::init_tracing();
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let library = dir.path().join("libruntime.so");

    let launcher = common::fixture_classes()
        .into_iter()
        .fold(VmLauncher::new(), |launcher, class| launcher.with_class(class));
    let config = StartConfig::new(&library).property("app.mode", "test");

    // --- Before start ---

    let err = xenobind::session().unwrap_err();
    assert!(matches!(err, Error::Startup(_)), "got {:?}", err);

    // --- Failed start leaves nothing behind ---

    let err = xenobind::start(&launcher, &config).unwrap_err();
    match err {
        Error::Startup(reason) => assert!(reason.contains("libruntime.so"), "reason: {}", reason),
        _ => panic!("Expected Startup, got {:?}", err),
    }
    assert!(matches!(xenobind::session(), Err(Error::Startup(_))));

    // --- Successful start ---

    fs::write(&library, b"").expect("Failed to create library file");
    let session = xenobind::start(&launcher, &config).expect("start");

    let system = session.get_class("java.lang.System").expect("System");
    let mode = system.call("getProperty", &[Value::from("app.mode")]).expect("getProperty");
    assert_eq!(str(&mode), "test");
    assert_eq!(system.call("getProperty", &[Value::from("app.missing")]).expect("getProperty"), Value::Null);

    let installed = xenobind::session().expect("session after start");
    let echo = installed.get_class("demo.Echo").expect("Echo");
    assert_eq!(echo.call("id", &[Value::Int(7)]).expect("id"), Value::Int(7));
    // Clones share the cache.
    assert!(session.cache().is_cached("demo.Echo"));

    // --- Second start ---

    let err = xenobind::start(&launcher, &config).unwrap_err();
    match err {
        Error::Startup(reason) => assert!(reason.contains("already running"), "reason: {}", reason),
        _ => panic!("Expected Startup, got {:?}", err),
    }
    assert!(xenobind::session().is_ok());
}
