use std::io::Write;

use tempfile::tempdir;

use super::file_io::create_parent_dir_if_not_exist;
use super::file_io::list_json_files;
use super::file_io::open_file_for_append;
use crate::Error;
use crate::SystemError;

/// Passed: "/tmp/files/data.txt"
/// Expected: "/tmp/files" created
#[test]
fn test_create_parent_dir_for_file() {
    let temp_dir = tempdir().unwrap();
    let file_path = temp_dir.path().join("files").join("data.txt");

    create_parent_dir_if_not_exist(&file_path).unwrap();

    let parent_dir = file_path.parent().unwrap();
    assert!(parent_dir.is_dir());
    // File itself should NOT be created
    assert!(!file_path.exists());
}

#[test]
fn test_open_file_for_append_keeps_content() {
    let temp_dir = tempdir().unwrap();
    let path = temp_dir.path().join("logs").join("dynamic-cache.log");

    {
        let mut file = open_file_for_append(path.clone()).unwrap();
        writeln!(file, "first").unwrap();
    }
    {
        let mut file = open_file_for_append(path.clone()).unwrap();
        writeln!(file, "second").unwrap();
    }

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
}

#[test]
fn test_list_json_files_sorted_and_filtered() {
    let temp_dir = tempdir().unwrap();
    for name in ["b.json", "a.json", "notes.txt"] {
        std::fs::write(temp_dir.path().join(name), "{}").unwrap();
    }
    std::fs::create_dir(temp_dir.path().join("nested.json")).unwrap();

    let files = list_json_files(temp_dir.path()).unwrap();
    let names: Vec<_> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["a.json", "b.json"]);
}

#[test]
fn test_list_json_files_missing_dir() {
    let temp_dir = tempdir().unwrap();
    let result = list_json_files(&temp_dir.path().join("absent"));
    assert!(matches!(result, Err(Error::System(SystemError::Io(_)))));
}
