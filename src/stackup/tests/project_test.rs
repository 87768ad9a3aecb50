mod common;

use stackup::confirm::parse_answer;
use stackup::{AlwaysYes, ConfirmationPolicy, FixedAnswer, ProjectRoot, UseDefaults};

#[test]
fn test_discover_walks_up_to_marker() {
    let (_dir, root) = common::temp_project();
    common::write(&root, "pyproject.toml", "[project]\nname = \"kosmos\"\n");
    let nested = root.join("kosmos").join("agents");
    std::fs::create_dir_all(&nested).unwrap();

    let found = ProjectRoot::discover(&nested).unwrap();
    assert_eq!(found, root);
    assert_eq!(found.env_file(), root.path().join(".env"));
    assert_eq!(found.lock_file(), root.path().join(".stackup.lock"));
}

#[test]
fn test_root_must_be_a_directory() {
    let (_dir, root) = common::temp_project();
    common::write(&root, "file.txt", "x");
    assert!(ProjectRoot::new(root.join("file.txt")).is_err());
    assert!(ProjectRoot::new(root.join("missing")).is_err());
}

#[tokio::test]
async fn test_confirmation_policies() {
    assert!(!UseDefaults.confirm("Recreate?", false).await);
    assert!(UseDefaults.confirm("Continue?", true).await);
    assert!(AlwaysYes.confirm("Recreate?", false).await);
    assert!(!FixedAnswer(false).confirm("Continue?", true).await);

    assert_eq!(parse_answer("Y\n"), Some(true));
    assert_eq!(parse_answer(" yes "), Some(true));
    assert_eq!(parse_answer("N"), Some(false));
    assert_eq!(parse_answer(""), None);
    assert_eq!(parse_answer("maybe"), None);
}
