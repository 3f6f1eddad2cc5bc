use std::path::PathBuf;

pub fn get_test_fixture_path(language: &str, fixture_name: Option<&str>) -> PathBuf {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(language);
    match fixture_name {
        Some(fixture_name) => root.join(fixture_name),
        None => root,
    }
}

pub fn read_fixture(language: &str, fixture_name: &str) -> String {
    let path = get_test_fixture_path(language, Some(fixture_name));
    std::fs::read_to_string(&path).unwrap_or_else(|_| panic!("Failed to read: {}", path.display()))
}
