use std::path::PathBuf;

use gst::prelude::*;
use gstframeextractor::{extract_thumbnail, initialize, Error, Initialized, Source};
use serial_test::serial;

fn init() -> Initialized {
    let (initialized, _) =
        initialize(["thumbnail-test"], &mut std::io::sink()).expect("Failed to initialize");
    initialized
}

// videotestsrc with fixed 320x240 output
fn test_source(num_buffers: i32) -> Source {
    let bin = gst::parse::bin_from_description(
        &format!("videotestsrc num-buffers={num_buffers} ! video/x-raw,width=320,height=240"),
        true,
    )
    .expect("Failed to create test source bin");
    Source::Element(bin.upcast())
}

fn create_temp_filepath(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "gst-frame-extractor-thumbnail-{}-{}",
        std::process::id(),
        name
    ))
}

#[test]
#[serial]
fn test_writes_scaled_thumbnail() {
    let initialized = init();
    let output = create_temp_filepath("scaled.png");

    let thumbnail = extract_thumbnail(&initialized, test_source(5), &output, 60)
        .expect("Failed to extract thumbnail");
    assert_eq!(thumbnail.path, output);
    assert_eq!((thumbnail.width, thumbnail.height), (80, 60));

    let img = image::open(&output).expect("Thumbnail is not a readable image");
    assert_eq!((img.width(), img.height()), (80, 60));

    let _ = std::fs::remove_file(output);
}

#[test]
#[serial]
fn test_unwritable_output() {
    let initialized = init();
    let output = create_temp_filepath("missing-dir").join("thumb.png");

    let err = extract_thumbnail(&initialized, test_source(5), &output, 60).unwrap_err();
    match err {
        Error::Stream { message, .. } => {
            assert!(message.contains("thumbnail"), "Unexpected message {message}");
        }
        other => panic!("Unexpected error {other}"),
    }
    assert!(!output.exists());
}

#[test]
#[serial]
fn test_empty_stream() {
    let initialized = init();
    let output = create_temp_filepath("empty.png");

    let err = extract_thumbnail(&initialized, test_source(0), &output, 60).unwrap_err();
    // Depending on timing decodebin either reports the empty stream itself or
    // lets EOS through without a frame
    assert!(
        matches!(err, Error::NoFrame | Error::Stream { .. }),
        "Unexpected error {err}"
    );
    assert!(!output.exists());
}
