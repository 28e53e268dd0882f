use gstframeextractor::{initialize, Version};

// The banner is only written by the first initialization in a process, so
// everything that depends on it lives in this one test.
#[test]
fn test_initialize_prints_banner_once() {
    let mut out = Vec::new();
    let (initialized, args) = initialize(
        ["bootstrap-test", "--gst-debug-level=1", "video.mkv", "--max-frames=2"],
        &mut out,
    )
    .expect("Failed to initialize");

    let (major, minor, micro, _) = gst::version();
    let line = String::from_utf8(out).unwrap();
    assert_eq!(line, format!("{}\n", Version::runtime().banner()));
    assert!(line.starts_with(&format!(
        "This program is linked against GStreamer {}.{}.{} ",
        major, minor, micro
    )));
    assert!(line.ends_with('\n'));
    assert_eq!(line.lines().count(), 1);

    assert_eq!(initialized.version(), Version::runtime());
    assert_eq!(args, ["bootstrap-test", "video.mkv", "--max-frames=2"]);

    // The element is usable by name once initialized
    assert!(gst::ElementFactory::find("framesink").is_some());

    let mut out = Vec::new();
    let (again, args) = initialize(["bootstrap-test"], &mut out).expect("Failed to re-initialize");
    assert!(out.is_empty(), "Banner printed twice");
    assert_eq!(again.version(), initialized.version());
    assert_eq!(args, ["bootstrap-test"]);
}

#[test]
fn test_invalid_option_is_rejected() {
    let mut out = Vec::new();
    let err = initialize(["bootstrap-test", "--gst-debug-level=verbose"], &mut out).unwrap_err();
    assert!(matches!(err, gstframeextractor::Error::InvalidOption { .. }));
    assert!(out.is_empty());
}
