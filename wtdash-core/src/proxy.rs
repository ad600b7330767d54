//! Reverse-proxy dynamic config scan.
//!
//! Each file in the dynamic directory carries one routing rule. A file that
//! names both a `Host(...)` hostname and a `host.docker.internal:<port>`
//! backend is indexed by that port.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

static HOST_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"Host\(\s*[`"']([^`"']+)[`"']"#).expect("valid regex"));

static BACKEND_PORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"host\.docker\.internal:(\d+)").expect("valid regex"));

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Route {
    /// File name without extension
    pub source: String,
    pub host: String,
}

/// Routes by backend port, several per port when files collide
#[derive(Clone, Debug, Default)]
pub struct RouteIndex {
    by_port: BTreeMap<u16, Vec<Route>>,
}

impl RouteIndex {
    /// Scan a directory. A missing or unreadable directory gives an empty index.
    pub fn scan(dir: &Path) -> Self {
        let mut index = Self::default();
        let Ok(entries) = std::fs::read_dir(dir) else {
            return index;
        };

        let mut files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        files.sort();

        for path in files {
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let source = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            index.insert_rule(&source, &content);
        }

        index
    }

    /// Index one rule file's content
    pub fn insert_rule(&mut self, source: &str, content: &str) {
        let host = HOST_RULE
            .captures(content)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());
        let port = BACKEND_PORT
            .captures(content)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u16>().ok());

        if let (Some(host), Some(port)) = (host, port) {
            self.by_port.entry(port).or_default().push(Route {
                source: source.to_string(),
                host,
            });
        }
    }

    /// Hostname routed to `port`. When several files route there, the one
    /// not named after the alias (a hand-written override) wins.
    pub fn host_for(&self, port: u16, alias: &str) -> Option<&str> {
        let routes = self.by_port.get(&port)?;
        routes
            .iter()
            .find(|r| r.source != alias)
            .or_else(|| routes.first())
            .map(|r| r.host.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.by_port.is_empty()
    }
}
