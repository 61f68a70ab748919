//! Tests for `src/fingerprint.rs`.

use std::sync::Arc;

use sensorwatch::fingerprint::{contains_marker, content_hash, ErrorLogFingerprint};

#[test]
fn first_body_is_new() {
    let fp = ErrorLogFingerprint::new();
    assert_eq!(fp.current(), None);
    assert!(fp.observe(b"abc"));
    assert_eq!(fp.current(), Some(content_hash(b"abc")));
}

#[test]
fn same_body_is_not_new() {
    let fp = ErrorLogFingerprint::new();
    assert!(fp.observe(b"abc"));
    assert!(!fp.observe(b"abc"));
}

#[test]
fn going_back_to_an_old_body_is_new() {
    let fp = ErrorLogFingerprint::new();
    assert!(fp.observe(b"a"));
    assert!(fp.observe(b"b"));
    assert!(fp.observe(b"a"));
}

#[test]
fn hash_is_sha256_hex() {
    assert_eq!(
        content_hash(b""),
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
    );
}

#[test]
fn marker_must_be_contiguous() {
    assert!(contains_marker(b"2024 ERROR (Main)", b" ERROR "));
    assert!(!contains_marker(b"2024 ERRORS", b" ERROR "));
    assert!(!contains_marker(b"", b" ERROR "));
    assert!(contains_marker(b"anything", b""));
}

#[test]
fn concurrent_observers_agree_on_one_winner() {
    let fp = Arc::new(ErrorLogFingerprint::new());
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let fp = Arc::clone(&fp);
            std::thread::spawn(move || fp.observe(b"same body"))
        })
        .collect();

    let wins = handles
        .into_iter()
        .map(|h| h.join().expect("thread should not panic"))
        .filter(|won| *won)
        .count();
    assert_eq!(wins, 1);
}
