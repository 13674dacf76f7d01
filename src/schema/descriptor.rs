//! `serde`-backed schema descriptor, decoupled from whatever encoding the
//! host embeds it in (JSON, TOML, YAML, or built directly in Rust). See
//! `spec.md` §6 for the field grammar this mirrors.
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default)]
    pub primary: Option<bool>,
    #[serde(rename = "primary-key", default)]
    pub primary_key: Option<bool>,
    #[serde(default)]
    pub index: Option<bool>,
    #[serde(default)]
    pub length: Option<usize>,
    #[serde(rename = "zero-fill", default)]
    pub zero_fill: Option<bool>,
    #[serde(default)]
    pub aliases: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,
    #[serde(rename = "sources-from", default)]
    pub sources_from: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(rename = "sources-file-filter", default)]
    pub sources_file_filter: Option<String>,
    #[serde(default)]
    pub filespec: Option<String>,
    #[serde(default)]
    pub expires: Option<u64>,
    pub columns: Vec<ColumnDescriptor>,
    #[serde(rename = "search-engine", default)]
    pub search_engine: Option<String>,
    #[serde(rename = "network-from", default)]
    pub network_from: Option<String>,
    #[serde(rename = "mask-from", default)]
    pub mask_from: Option<String>,
    #[serde(default)]
    pub index: Option<String>,
}

impl SchemaDescriptor {
    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_descriptor() {
        let json = r#"{
            "name": "db",
            "path": "/tmp/db",
            "columns": [
                {"name": "id", "type": "uint", "primary": true},
                {"name": "name", "type": "string"}
            ]
        }"#;
        let d = SchemaDescriptor::from_json(json).unwrap();
        assert_eq!(d.name, "db");
        assert_eq!(d.columns.len(), 2);
        assert_eq!(d.columns[0].primary, Some(true));
    }
}
