mod common;

use tempfile::tempdir;

use common::{create_db, ids, int_column, text_column, Row};
use smdb_companion_core::metadata::{find, replace, Metadata};
use smdb_companion_core::{Algorithm, ReplaceError};

fn fixture() -> (tempfile::TempDir, std::path::PathBuf) {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("lib.sqlite");
    let a = tmp.path().join("lib/Door Slam.wav");
    let b = tmp.path().join("lib/door creak.wav");
    let c = tmp.path().join("lib/window.wav");
    create_db(
        &db,
        &[
            Row::new(1, &a).description("DOOR slam, heavy"),
            Row::new(2, &b).description("door creak [old]"),
            Row::new(3, &c).description("window rattle"),
        ],
    );
    (tmp, db)
}

#[test]
fn test_find_case_insensitive_and_sensitive() {
    let (_tmp, db) = fixture();

    let found = find(&db, "door", "Description", false).unwrap();
    assert_eq!(ids(&found), vec![1, 2]);
    assert!(found.iter().all(|r| r.algorithm == vec![Algorithm::Replace]));

    let found = find(&db, "door", "description", true).unwrap();
    assert_eq!(ids(&found), vec![2]);
}

#[test]
fn test_find_treats_glob_characters_literally() {
    let (_tmp, db) = fixture();
    assert_eq!(ids(&find(&db, "[old]", "Description", true).unwrap()), vec![2]);
    assert!(find(&db, "d*r", "Description", true).unwrap().is_empty());
}

#[test]
fn test_unknown_column_is_rejected() {
    let (_tmp, db) = fixture();
    assert!(matches!(
        find(&db, "door", "Description; DROP TABLE justinmetadata", false),
        Err(ReplaceError::UnknownColumn(_))
    ));
    let request = Metadata {
        find: "door".into(),
        replace: "gate".into(),
        column: "NoSuchColumn".into(),
        ..Metadata::default()
    };
    assert!(matches!(replace(&db, &request), Err(ReplaceError::UnknownColumn(_))));
    assert_eq!(text_column(&db, 2, "Description").as_deref(), Some("door creak [old]"));
}

#[test]
fn test_case_insensitive_replace_counts_changed_rows() {
    let (_tmp, db) = fixture();
    let request = Metadata {
        find: "door".into(),
        replace: "gate".into(),
        column: "Description".into(),
        case_sensitive: false,
        mark_dirty: true,
    };
    assert_eq!(replace(&db, &request).unwrap(), 2);
    assert_eq!(text_column(&db, 1, "Description").as_deref(), Some("gate slam, heavy"));
    assert_eq!(text_column(&db, 2, "Description").as_deref(), Some("gate creak [old]"));
    assert_eq!(text_column(&db, 3, "Description").as_deref(), Some("window rattle"));
    assert_eq!(int_column(&db, 1, "_Dirty"), Some(1));
    assert_eq!(int_column(&db, 3, "_Dirty"), None);
}

#[test]
fn test_case_insensitive_find_folds_accented_letters_like_replace() {
    let tmp = tempdir().unwrap();
    let db = tmp.path().join("lib.sqlite");
    create_db(
        &db,
        &[
            Row::new(1, &tmp.path().join("a.wav")).description("ÉCHO lointain"),
            Row::new(2, &tmp.path().join("b.wav")).description("écho proche"),
            Row::new(3, &tmp.path().join("c.wav")).description("echo plain"),
        ],
    );

    let found = find(&db, "écho", "Description", false).unwrap();
    assert_eq!(ids(&found), vec![1, 2]);
    assert_eq!(found[0].data.get("Description").map(String::as_str), Some("ÉCHO lointain"));
    assert_eq!(ids(&find(&db, "écho", "Description", true).unwrap()), vec![2]);

    let request = Metadata {
        find: "écho".into(),
        replace: "delay".into(),
        column: "Description".into(),
        case_sensitive: false,
        mark_dirty: false,
    };
    assert_eq!(replace(&db, &request).unwrap(), found.len());
    assert_eq!(text_column(&db, 1, "Description").as_deref(), Some("delay lointain"));
    assert_eq!(text_column(&db, 3, "Description").as_deref(), Some("echo plain"));
}

#[test]
fn test_replacement_text_is_literal() {
    let (_tmp, db) = fixture();
    let request = Metadata {
        find: "window".into(),
        replace: "$1 pane".into(),
        column: "Description".into(),
        case_sensitive: true,
        mark_dirty: false,
    };
    assert_eq!(replace(&db, &request).unwrap(), 1);
    assert_eq!(text_column(&db, 3, "Description").as_deref(), Some("$1 pane rattle"));
}

#[test]
fn test_filename_replace_keeps_file_path_in_sync() {
    let (tmp, db) = fixture();
    let request = Metadata {
        find: "window".into(),
        replace: "shutter".into(),
        column: "Filename".into(),
        case_sensitive: true,
        mark_dirty: false,
    };
    assert_eq!(replace(&db, &request).unwrap(), 1);
    let expected = tmp.path().join("lib/shutter.wav");
    assert_eq!(
        text_column(&db, 3, "FilePath"),
        Some(expected.to_string_lossy().into_owned())
    );
}

#[test]
fn test_empty_find_is_rejected() {
    let (_tmp, db) = fixture();
    let request = Metadata {
        column: "Description".into(),
        ..Metadata::default()
    };
    assert!(matches!(replace(&db, &request), Err(ReplaceError::EmptyFind)));
}
