//! Gateway configuration, loaded from TOML.
//!
//! ```toml
//! recover_faults = true
//! default_schema = "alpha"
//!
//! [[schemas]]
//! name = "alpha"
//! backend_type = "elasticsearch"
//! nodes = ["es1"]
//!
//! [[nodes]]
//! name = "es1"
//! address = "http://localhost:9200"
//!
//! [elasticsearch]
//! max_rows = 1000
//! ```
use crate::errors::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::warn;
use url::Url;

/// Default cap on the number of documents fetched per query.
pub const DEFAULT_MAX_ROWS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Turn panics while handling a query into errors instead of dropping the
    /// connection.
    #[serde(default = "default_true")]
    pub recover_faults: bool,
    /// Schema sessions start in.
    #[serde(default)]
    pub default_schema: Option<String>,
    #[serde(default)]
    pub schemas: Vec<SchemaConfig>,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub elasticsearch: ElasticsearchConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        GatewayConfig {
            recover_faults: true,
            default_schema: None,
            schemas: Vec::new(),
            nodes: Vec::new(),
            elasticsearch: ElasticsearchConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    pub name: String,
    pub backend_type: String,
    /// Names of the nodes serving this schema.
    #[serde(default)]
    pub nodes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub name: String,
    /// Inferred from the schemas using this node when left out.
    #[serde(default)]
    pub backend_type: Option<String>,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ElasticsearchConfig {
    #[serde(default = "default_max_rows")]
    pub max_rows: u64,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        ElasticsearchConfig {
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_rows() -> u64 {
    DEFAULT_MAX_ROWS
}

impl GatewayConfig {
    /// Parse and validate a config from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut config: GatewayConfig =
            toml::from_str(s).map_err(|e| GatewayError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Check the config for consistency, filling in node backend types.
    pub fn validate(&mut self) -> Result<()> {
        let mut schema_names = HashSet::new();
        for schema in &self.schemas {
            if !schema_names.insert(schema.name.to_lowercase()) {
                return Err(GatewayError::DuplicateSchema(schema.name.clone()));
            }
        }

        let mut inferred: HashMap<&str, &str> = HashMap::new();
        for schema in &self.schemas {
            if schema.nodes.is_empty() {
                warn!(schema = %schema.name, "schema has no nodes configured");
            }
            for node in &schema.nodes {
                if !self.nodes.iter().any(|n| &n.name == node) {
                    return Err(GatewayError::Config(format!(
                        "schema '{}' references unknown node '{node}'",
                        schema.name
                    )));
                }
                match inferred.get(node.as_str()) {
                    Some(existing) if *existing != schema.backend_type => {
                        return Err(GatewayError::Config(format!(
                            "node '{node}' is used with backend types '{existing}' and '{}'",
                            schema.backend_type
                        )));
                    }
                    _ => {
                        inferred.insert(node, &schema.backend_type);
                    }
                }
            }
        }

        let mut node_names = HashSet::new();
        let mut resolved = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            if !node_names.insert(node.name.as_str()) {
                return Err(GatewayError::Config(format!("duplicate node '{}'", node.name)));
            }
            Url::parse(&node.address).map_err(|e| {
                GatewayError::Config(format!(
                    "node '{}' has invalid address '{}': {e}",
                    node.name, node.address
                ))
            })?;

            let backend_type = match (&node.backend_type, inferred.get(node.name.as_str())) {
                (Some(explicit), Some(used)) if explicit.as_str() != *used => {
                    return Err(GatewayError::Config(format!(
                        "node '{}' is declared as '{explicit}' but used as '{used}'",
                        node.name
                    )));
                }
                (Some(explicit), _) => Some(explicit.clone()),
                (None, Some(used)) => Some(used.to_string()),
                (None, None) => {
                    warn!(node = %node.name, "node isn't used by any schema");
                    None
                }
            };
            resolved.push(backend_type);
        }
        for (node, backend_type) in self.nodes.iter_mut().zip(resolved) {
            node.backend_type = backend_type;
        }

        if let Some(default) = &self.default_schema {
            if !schema_names.contains(&default.to_lowercase()) {
                return Err(GatewayError::SchemaNotFound(default.clone()));
            }
        }

        Ok(())
    }

    /// Addresses of the nodes serving a schema, in configured order.
    pub fn schema_addresses(&self, schema: &SchemaConfig) -> Vec<String> {
        schema
            .nodes
            .iter()
            .filter_map(|name| self.nodes.iter().find(|n| &n.name == name))
            .map(|n| n.address.trim_end_matches('/').to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
default_schema = "alpha"

[[schemas]]
name = "alpha"
backend_type = "elasticsearch"
nodes = ["es1", "es2"]

[[schemas]]
name = "beta"
backend_type = "elasticsearch"
nodes = ["es2"]

[[nodes]]
name = "es1"
address = "http://localhost:9200/"

[[nodes]]
name = "es2"
backend_type = "elasticsearch"
address = "http://10.0.0.2:9200"

[elasticsearch]
max_rows = 50
"#;

    #[test]
    fn parse_sample() {
        let config = GatewayConfig::from_toml_str(SAMPLE).unwrap();
        assert!(config.recover_faults);
        assert_eq!(Some("alpha".to_string()), config.default_schema);
        assert_eq!(50, config.elasticsearch.max_rows);
        assert_eq!(
            Some("elasticsearch".to_string()),
            config.nodes[0].backend_type
        );
        assert_eq!(
            vec!["http://localhost:9200", "http://10.0.0.2:9200"],
            config.schema_addresses(&config.schemas[0])
        );
    }

    #[test]
    fn defaults() {
        let config = GatewayConfig::from_toml_str("").unwrap();
        assert_eq!(GatewayConfig::default(), config);
        assert_eq!(DEFAULT_MAX_ROWS, config.elasticsearch.max_rows);
    }

    #[test]
    fn duplicate_schema() {
        let err = GatewayConfig::from_toml_str(
            r#"
[[schemas]]
name = "a"
backend_type = "elasticsearch"

[[schemas]]
name = "A"
backend_type = "elasticsearch"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::DuplicateSchema(_)));
    }

    #[test]
    fn bad_address() {
        let err = GatewayConfig::from_toml_str(
            r#"
[[nodes]]
name = "es1"
address = "not a url"
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid address"), "{err}");
    }

    #[test]
    fn unknown_node() {
        let err = GatewayConfig::from_toml_str(
            r#"
[[schemas]]
name = "a"
backend_type = "elasticsearch"
nodes = ["missing"]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown node"), "{err}");
    }

    #[test]
    fn conflicting_node_type() {
        let err = GatewayConfig::from_toml_str(
            r#"
[[schemas]]
name = "a"
backend_type = "elasticsearch"
nodes = ["n"]

[[nodes]]
name = "n"
backend_type = "mongodb"
address = "mongodb://localhost"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn unknown_default_schema() {
        let err = GatewayConfig::from_toml_str(r#"default_schema = "nope""#).unwrap_err();
        assert!(matches!(err, GatewayError::SchemaNotFound(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = GatewayConfig::load(file.path()).unwrap();
        assert_eq!(2, config.schemas.len());

        let err = GatewayConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }
}
