use forum_fs::{NormalizedPath, RobustnessConfig, io};
use std::fs;
use tempfile::TempDir;

#[test]
fn test_write_atomic_creates_file_and_parents() {
    let temp = TempDir::new().unwrap();
    let path = NormalizedPath::new(temp.path().join("nested/dir/extensions.json"));

    io::write_atomic(&path, b"[]", RobustnessConfig::default()).unwrap();

    let content = fs::read_to_string(path.to_native()).unwrap();
    assert_eq!(content, "[]");
}

#[test]
fn test_write_atomic_overwrites_existing() {
    let temp = TempDir::new().unwrap();
    let file_path = temp.path().join("manifest.json");
    fs::write(&file_path, "original").unwrap();

    let path = NormalizedPath::new(&file_path);
    io::write_text(&path, "updated").unwrap();

    assert_eq!(fs::read_to_string(&file_path).unwrap(), "updated");
}

#[test]
fn test_write_is_visible_to_immediate_read() {
    let temp = TempDir::new().unwrap();
    let path = NormalizedPath::new(temp.path().join("state.json"));

    for i in 0..20 {
        let content = format!("{{\"n\":{i}}}");
        io::write_text(&path, &content).unwrap();
        assert_eq!(io::read_text(&path).unwrap(), content);
    }
}

#[test]
fn test_read_text_nonexistent_file() {
    let path = NormalizedPath::new("/nonexistent/forum/file.json");
    let err = io::read_text(&path).unwrap_err();
    assert!(err.is_not_found());
}
