//! Global subscriber installation.
//!
//! Lives in its own test binary so the installed subscriber does not capture
//! events from the library's unit tests.

use servingflow::observability::{init_tracing, LogConfig};

#[test]
fn test_init_tracing_installs_once() {
    let config = LogConfig::new().with_filter("warn").with_json(true);

    assert!(init_tracing(&config).is_ok());

    let err = init_tracing(&config).unwrap_err();
    assert_eq!(err.field, "subscriber");
}
