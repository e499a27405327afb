//! Unit tests for config_store module
//! No filesystem, timing, or watch sessions.

#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]


use std::sync::Arc;

use serde::Deserialize;
use toml::Value;

use super::{
    Config, ConfigError, Tree, WatchState,
    path_ops::{navigate_path, normalize, path_matches},
};
use crate::provider::Loader;

fn tree(source: &str) -> Tree {
    toml::from_str(source).unwrap()
}

struct StaticLoader {
    name: &'static str,
    tree: Tree,
}

impl StaticLoader {
    fn new(name: &'static str, source: &str) -> Self {
        Self {
            name,
            tree: tree(source),
        }
    }
}

impl Loader for StaticLoader {
    fn load(&self) -> Result<Tree, super::BoxError> {
        Ok(self.tree.clone())
    }

    fn name(&self) -> String {
        self.name.to_string()
    }
}

struct FailingLoader;

impl Loader for FailingLoader {
    fn load(&self) -> Result<Tree, super::BoxError> {
        Err("load error".into())
    }
}

#[test]
fn path_matches_segment_prefixes() {
    assert!(path_matches("server.port", "server", "."));
    assert!(path_matches("server", "server.port", "."));
    assert!(path_matches("server.port", "server.*", "."));
    assert!(path_matches("server.port", "*", "."));
    assert!(!path_matches("server.port", "client", "."));
    assert!(!path_matches("serverless", "server", "."));
}

#[test]
fn normalize_lowercases_and_drops_empty_segments() {
    assert_eq!(normalize("Server..Port", "."), "server.port");
    assert_eq!(normalize("", "."), "");
    assert_eq!(normalize("A/B", "/"), "a/b");
}

#[test]
fn navigate_path_walks_tables_and_arrays() {
    let root = tree(
        r#"
hosts = ["a", "b"]

[server]
port = 8080
"#,
    );

    assert_eq!(
        navigate_path(&root, "server.port", "."),
        Some(Value::Integer(8080))
    );
    assert_eq!(
        navigate_path(&root, "HOSTS.1", "."),
        Some(Value::String("b".to_string()))
    );
    assert_eq!(navigate_path(&root, "server.missing", "."), None);
    assert_eq!(navigate_path(&root, "server.port.deeper", "."), None);
    assert_eq!(navigate_path(&root, "hosts.x", "."), None);
    assert_eq!(navigate_path(&root, "", "."), Some(Value::Table(root.clone())));
}

#[test]
fn empty_store_reads_as_empty_tree() {
    let config = Config::new();

    assert_eq!(config.get(""), Some(Value::Table(Tree::new())));
    assert_eq!(config.unmarshal::<String>("anything").unwrap(), "");
    assert!(!config.exists("anything"));
    assert_eq!(config.watch_state(), WatchState::Idle);
}

#[test]
fn load_merges_in_order() {
    let config = Config::new();

    config
        .load(StaticLoader::new(
            "defaults",
            r#"
[server]
host = "localhost"
port = 80
"#,
        ))
        .unwrap();
    config
        .load(StaticLoader::new(
            "override",
            r#"
[server]
port = 8080
"#,
        ))
        .unwrap();

    assert_eq!(config.unmarshal::<String>("server.host").unwrap(), "localhost");
    assert_eq!(config.unmarshal::<i64>("server.port").unwrap(), 8080);
}

#[test]
fn load_is_case_insensitive() {
    let config = Config::new();
    config
        .load(StaticLoader::new("upper", "[Server]\nPort = 1\n"))
        .unwrap();
    config
        .load(StaticLoader::new("lower", "[server]\nhost = \"h\"\n"))
        .unwrap();

    assert_eq!(config.unmarshal::<i64>("SERVER.port").unwrap(), 1);
    assert_eq!(config.unmarshal::<String>("server.HOST").unwrap(), "h");
}

#[test]
fn load_error_is_wrapped_and_leaves_tree_untouched() {
    let config = Config::new();
    config.load(StaticLoader::new("first", "a = 1\n")).unwrap();

    let err = config.load(FailingLoader).unwrap_err();

    assert_eq!(err.to_string(), "load configuration: load error");
    assert!(matches!(err, ConfigError::Load { .. }));
    assert_eq!(config.get(""), Some(Value::Table(tree("a = 1\n"))));
}

#[test]
fn load_all_fails_fast() {
    let config = Config::new();
    let loaders: Vec<Arc<dyn Loader>> = vec![
        Arc::new(StaticLoader::new("first", "a = 1\n")),
        Arc::new(FailingLoader),
        Arc::new(StaticLoader::new("third", "b = 2\n")),
    ];

    assert!(config.load_all(loaders).is_err());
    assert!(config.exists("a"));
    assert!(!config.exists("b"));
}

#[test]
fn load_all_with_nothing_is_noop() {
    let config = Config::new();

    config.load_all(Vec::<Arc<dyn Loader>>::new()).unwrap();

    assert_eq!(config.get(""), Some(Value::Table(Tree::new())));
}

#[test]
fn unmarshal_into_struct() {
    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Server {
        host: String,
        port: u16,
        #[serde(default)]
        tags: Vec<String>,
    }

    let config = Config::new();
    config
        .load(StaticLoader::new(
            "file",
            r#"
[server]
host = "example.org"
port = 443
tags = ["edge"]
"#,
        ))
        .unwrap();

    let server: Server = config.unmarshal("server").unwrap();
    assert_eq!(
        server,
        Server {
            host: "example.org".to_string(),
            port: 443,
            tags: vec!["edge".to_string()],
        }
    );

    let missing: Server = config.unmarshal("client").unwrap();
    assert_eq!(missing, Server::default());
}

#[test]
fn unmarshal_decode_error_names_path() {
    let config = Config::new();
    config
        .load(StaticLoader::new("file", "port = \"not a number\"\n"))
        .unwrap();

    let err = config.unmarshal::<u16>("port").unwrap_err();

    assert!(matches!(err, ConfigError::Decode { ref path, .. } if path == "port"));
    assert!(err.to_string().contains("'port'"));
}

#[test]
fn custom_delimiter() {
    let config = Config::builder().with_delimiter("/").build();
    config
        .load(StaticLoader::new("file", "[server]\nport = 9\n"))
        .unwrap();

    assert_eq!(config.unmarshal::<i64>("server/port").unwrap(), 9);
    assert!(!config.exists("server.port"));
}

#[test]
fn explain_tracks_last_writer() {
    let config = Config::new();
    config
        .load(StaticLoader::new(
            "defaults",
            "[server]\nhost = \"localhost\"\nport = 80\n",
        ))
        .unwrap();
    config
        .load(StaticLoader::new("override", "[server]\nport = 8080\n"))
        .unwrap();

    assert_eq!(config.explain("server.port").as_deref(), Some("override"));
    assert_eq!(config.explain("server.host").as_deref(), Some("defaults"));
    assert_eq!(config.explain("server").as_deref(), Some("defaults, override"));
    assert_eq!(config.explain("client"), None);
}

#[test]
fn explain_forgets_replaced_tables() {
    let config = Config::new();
    config
        .load(StaticLoader::new("tables", "[server]\nport = 80\n"))
        .unwrap();
    config
        .load(StaticLoader::new("scalar", "server = \"off\"\n"))
        .unwrap();

    assert_eq!(config.explain("server").as_deref(), Some("scalar"));
    assert_eq!(config.explain("server.port"), None);
}

#[test]
fn on_change_none_registers_nothing() {
    let config = Config::new();

    config.on_change(None::<fn(&Config)>, &[]);
    config.on_change(None::<fn(&Config)>, &["config"]);
}

#[test]
fn default_loader_name_is_type_name() {
    let name = FailingLoader.name();

    assert!(name.ends_with("FailingLoader"), "{name}");
}

#[test]
fn config_error_reports_loader() {
    let err = ConfigError::Watch {
        loader: "file:///etc/app.toml".to_string(),
        source: "boom".into(),
    };

    assert_eq!(err.loader(), Some("file:///etc/app.toml"));
    assert_eq!(err.to_string(), "watch configuration change on error: boom");
}

#[test]
fn empty_table_change_keeps_existing_origins() {
    let config = Config::new();
    config
        .load(StaticLoader::new("defaults", "[a]\nb = 1\nc = 2\n"))
        .unwrap();

    let change = config.apply_change("watcher", tree("[A]\n"));

    assert!(change.paths.is_empty());
    assert_eq!(config.get("a.b"), Some(Value::Integer(1)));
    assert_eq!(config.explain("a.b").as_deref(), Some("defaults"));
    assert_eq!(config.explain("a").as_deref(), Some("defaults"));
}

#[test]
fn change_reports_only_merged_paths() {
    let config = Config::new();
    config
        .load(StaticLoader::new("defaults", "server = \"off\"\n[a]\nb = 1\n"))
        .unwrap();

    let change = config.apply_change("watcher", tree("[a]\nc = 2\n[server]\n"));

    assert_eq!(change.paths, vec!["a.c", "server"]);
    assert_eq!(config.explain("a").as_deref(), Some("defaults, watcher"));
    assert_eq!(config.explain("server").as_deref(), Some("watcher"));
}
