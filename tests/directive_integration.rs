//! Integration tests for the directive pipeline
//!
//! Capture-side flow: parse, resolve, merge, encode, and what the node side
//! reads back.

use bucketmount::directive::{conflict, decode, decode_lenient, encode_bounded, parse, resolver};
use bucketmount::{Bucket, MountError};
use std::path::Path;

#[test]
fn test_all_token_shapes_parse() {
    let cases = [
        ("bucket:/p", Bucket::Named("bucket".into()), "/p", None),
        ("bucket:/p:--a --b", Bucket::Named("bucket".into()), "/p", Some("--a --b")),
        (":/p", Bucket::All, "/p", None),
        ("/p", Bucket::Implicit, "/p", None),
        ("/p:--ro", Bucket::Implicit, "/p", Some("--ro")),
    ];

    for (token, bucket, path, flags) in cases {
        let d = parse(token).unwrap();
        assert_eq!(d.bucket(), &bucket, "{}", token);
        assert_eq!(d.mount_path(), path, "{}", token);
        assert_eq!(d.flags(), flags, "{}", token);
    }
}

#[test]
fn test_tokens_without_mount_path_rejected() {
    for token in ["", "bucket:", ":", "bucket::flags"] {
        assert!(
            matches!(parse(token), Err(MountError::Parse { .. })),
            "{:?} should not parse",
            token
        );
    }
}

#[test]
fn test_resolution_then_encoding() {
    let list = decode("b1:./p1;b2:/p2").unwrap();
    let resolved = resolver::resolve_all(&list, Path::new("/home/user/project")).unwrap();
    assert_eq!(
        encode_bounded(&resolved, 4096).unwrap(),
        "b1:/home/user/project/p1;b2:/p2"
    );

    let again = resolver::resolve_all(&resolved, Path::new("/elsewhere")).unwrap();
    assert_eq!(again, resolved);
}

#[test]
fn test_conflicting_capture_keeps_existing_list() {
    let existing = decode("bucket1:/tmp/m1;bucket2:/tmp/m2").unwrap();
    let before = encode_bounded(&existing, 4096).unwrap();

    for candidate in ["bucket3:/tmp/m1", ":/tmp/m1", "/tmp/m2"] {
        let candidates = decode(candidate).unwrap();
        assert!(matches!(
            conflict::merge(&existing, &candidates),
            Err(MountError::Conflict { .. })
        ));
    }
    assert_eq!(encode_bounded(&existing, 4096).unwrap(), before);

    let merged = conflict::merge(&existing, &decode("bucket3:/tmp/m3").unwrap()).unwrap();
    assert_eq!(merged.len(), 3);
}

#[test]
fn test_transport_bound_counts_terminator() {
    let list = decode("b:/x").unwrap();
    assert!(encode_bounded(&list, 5).is_ok());
    assert!(encode_bounded(&list, 4).is_err());
}

#[test]
fn test_lenient_decode_keeps_good_tokens() {
    let (list, errors) = decode_lenient("a:/mnt/a;;bucket:;/mnt/b:--x;");
    assert_eq!(list.len(), 2);
    assert_eq!(errors.len(), 1);
}
