#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]

use std::{
    fs,
    sync::{Arc, Mutex},
};

use tempfile::TempDir;
use toml::Value;

use super::{File, FileError, Loader, decode_json, decode_toml};
use crate::config_store::BoxError;

fn write(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn decode_toml_reads_tables() {
    let tree = decode_toml(b"[server]\nport = 1\n").unwrap();

    assert_eq!(tree["server"]["port"], Value::Integer(1));
}

#[test]
fn decode_toml_rejects_invalid_utf8() {
    assert!(decode_toml(&[0xff, 0xfe]).is_err());
}

#[test]
fn decode_json_reads_objects() {
    let tree = decode_json(br#"{"server": {"port": 1, "hosts": ["a"]}}"#).unwrap();

    assert_eq!(tree["server"]["port"], Value::Integer(1));
    assert_eq!(
        tree["server"]["hosts"],
        Value::Array(vec![Value::String("a".to_string())])
    );
}

#[test]
fn decode_json_rejects_non_objects() {
    assert!(decode_json(b"[1, 2]").is_err());
}

#[test]
fn file_loads_toml_by_default() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "config.toml", "name = \"strata\"\n");

    let tree = File::new(&path).load().unwrap();

    assert_eq!(tree["name"], Value::String("strata".to_string()));
}

#[test]
fn file_loads_with_custom_unmarshal() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "config.json", r#"{"name": "strata"}"#);

    let tree = File::new(&path).with_unmarshal(decode_json).load().unwrap();

    assert_eq!(tree["name"], Value::String("strata".to_string()));
}

#[test]
fn file_missing_is_read_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("missing.toml");

    let err = File::new(&path).load().unwrap_err();
    let err = err.downcast::<FileError>().unwrap();

    assert!(matches!(*err, FileError::Read { .. }));
    assert!(err.to_string().starts_with("read file"));
}

#[test]
fn file_invalid_content_is_unmarshal_error() {
    let dir = TempDir::new().unwrap();
    let path = write(&dir, "config.toml", "name = \n");

    let err = File::new(&path).load().unwrap_err();
    let err = err.downcast::<FileError>().unwrap();

    assert!(matches!(*err, FileError::Unmarshal { .. }));
}

#[test]
fn file_name_is_absolute_file_uri() {
    let file = File::new("relative/config.toml");
    let name = file.name();

    assert!(name.starts_with("file:///"), "{name}");
    assert!(name.ends_with("relative/config.toml"), "{name}");
    assert_eq!(file.path(), std::path::Path::new("relative/config.toml"));
}

#[test]
fn file_exposes_watch_and_status() {
    let file = File::new("config.toml");

    assert!(file.as_watcher().is_some());
    assert!(file.as_status_reporter().is_some());
}

#[test]
fn file_status_callback_is_stored() {
    let file = File::new("config.toml");
    let reports = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&reports);
    file.as_status_reporter()
        .unwrap()
        .status(Arc::new(move |ok: bool, err: Option<BoxError>| {
            sink.lock().unwrap().push((ok, err.map(|e| e.to_string())));
        }));
    file.report(false, Some("boom".into()));

    assert_eq!(
        *reports.lock().unwrap(),
        vec![(false, Some("boom".to_string()))]
    );
}

#[test]
fn file_name_falls_back_to_given_path() {
    // An empty path cannot be made absolute.
    assert_eq!(File::new("").name(), "");
}
