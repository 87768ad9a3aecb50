use stackup::Version;

#[test]
fn test_version_gate_compares_numerically() {
    let minimum: Version = "3.11".parse().unwrap();

    for too_old in ["3.9", "3.10", "3.10.13", "2.7.18"] {
        let v: Version = too_old.parse().unwrap();
        assert!(!v.satisfies(&minimum), "{} must not satisfy 3.11", too_old);
    }
    for ok in ["3.11", "3.11.0", "3.12.1", "3.13.0rc1", "4.0"] {
        let v: Version = ok.parse().unwrap();
        assert!(v.satisfies(&minimum), "{} must satisfy 3.11", ok);
    }
}

#[test]
fn test_version_extract_from_tool_output() {
    assert_eq!(
        Version::extract("Python 3.11.4"),
        Some(Version::new(3, 11, 4))
    );
    assert_eq!(
        Version::extract("Docker version 24.0.7, build afdd53b"),
        Some(Version::new(24, 0, 7))
    );
    assert_eq!(Version::extract("no version here"), None);
}

#[test]
fn test_version_parse_rejects_garbage() {
    assert!("".parse::<Version>().is_err());
    assert!("abc".parse::<Version>().is_err());
    assert_eq!("3.12.0rc1".parse::<Version>().unwrap(), Version::new(3, 12, 0));
    assert_eq!(Version::new(3, 11, 0).to_string(), "3.11.0");
}
