//! Pipeline specification types
//!
//! A specification is the structured reading of a natural-language request.
//! Generators return free-form documents; anything that does not fit a known
//! shape is kept verbatim as [`PipelineSpec::Unrecognized`] so the validator
//! can reject it with a precise reason.

use serde::{Deserialize, Serialize};

/// Structured pipeline specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PipelineSpec {
    /// Extract-transform-load pipeline from one source into one target
    Etl(EtlSpec),
    /// Document that matched no known spec shape
    Unrecognized(serde_json::Value),
}

impl PipelineSpec {
    /// Parse a generator document, falling back to `Unrecognized`
    pub fn from_value(value: serde_json::Value) -> Self {
        match serde_json::from_value::<EtlSpec>(value.clone()) {
            Ok(spec) => PipelineSpec::Etl(spec),
            Err(_) => PipelineSpec::Unrecognized(value),
        }
    }

    /// The ETL spec, if this document was recognized
    pub fn as_etl(&self) -> Option<&EtlSpec> {
        match self {
            PipelineSpec::Etl(spec) => Some(spec),
            PipelineSpec::Unrecognized(_) => None,
        }
    }
}

/// ETL pipeline specification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EtlSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub source: SourceSpec,
    pub transforms: Vec<TransformStep>,
    pub target: TargetSpec,
    /// Cron expression, `@`-macro or `manual`
    #[serde(default)]
    pub schedule: Option<String>,
    /// Set only when the request explicitly asks for deletes or drops
    #[serde(default)]
    pub allow_destructive: bool,
}

impl EtlSpec {
    /// Tables this spec declares (source, target and join inputs)
    pub fn declared_tables(&self) -> Vec<&str> {
        let mut tables = Vec::new();
        if let SourceSpec::Database { table } = &self.source {
            tables.push(table.as_str());
        }
        if let TargetSpec::Table { name } = &self.target {
            tables.push(name.as_str());
        }
        for step in &self.transforms {
            tables.extend(step.tables.iter().map(String::as_str));
        }
        tables
    }

    /// Files this spec declares (file source and file target)
    pub fn declared_files(&self) -> Vec<&str> {
        let mut files = Vec::new();
        if let SourceSpec::File { path, .. } = &self.source {
            files.push(path.as_str());
        }
        if let TargetSpec::File { path, .. } = &self.target {
            files.push(path.as_str());
        }
        files
    }
}

/// Where the pipeline reads from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSpec {
    File { path: String, format: FileFormat },
    Database { table: String },
    Api { url: String },
}

/// Where the pipeline writes to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetSpec {
    Table { name: String },
    File { path: String, format: FileFormat },
}

/// Supported data file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileFormat {
    Csv,
    Json,
    Jsonl,
    Parquet,
}

impl FileFormat {
    /// File extension (without the dot) expected for this format
    pub fn extension(self) -> &'static str {
        match self {
            FileFormat::Csv => "csv",
            FileFormat::Json => "json",
            FileFormat::Jsonl => "jsonl",
            FileFormat::Parquet => "parquet",
        }
    }
}

/// One transformation step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStep {
    pub op: TransformOp,
    pub description: String,
    /// Additional tables this step reads (join inputs)
    #[serde(default)]
    pub tables: Vec<String>,
}

/// Allowed transformation operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformOp {
    Select,
    Filter,
    Cast,
    Join,
    Aggregate,
    Dedupe,
    Derive,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_recognizes_etl() {
        let spec = PipelineSpec::from_value(json!({
            "name": "sales_load",
            "source": { "kind": "file", "path": "data/sales.csv", "format": "csv" },
            "transforms": [{ "op": "filter", "description": "drop empty rows" }],
            "target": { "kind": "table", "name": "sales" }
        }));

        let etl = spec.as_etl().expect("etl spec");
        assert_eq!(etl.name, "sales_load");
        assert_eq!(etl.declared_tables(), vec!["sales"]);
        assert_eq!(etl.declared_files(), vec!["data/sales.csv"]);
        assert!(!etl.allow_destructive);
    }

    #[test]
    fn test_from_value_falls_back_to_unrecognized() {
        let raw = json!({ "pipeline_name": "x", "source_type": "ftp" });
        let spec = PipelineSpec::from_value(raw.clone());
        assert_eq!(spec, PipelineSpec::Unrecognized(raw));
    }

    #[test]
    fn test_unknown_transform_op_is_unrecognized() {
        let spec = PipelineSpec::from_value(json!({
            "name": "p",
            "source": { "kind": "database", "table": "orders" },
            "transforms": [{ "op": "pivot", "description": "?" }],
            "target": { "kind": "table", "name": "orders_out" }
        }));
        assert!(spec.as_etl().is_none());
    }

    #[test]
    fn test_join_tables_are_declared() {
        let spec = EtlSpec {
            name: "orders".to_string(),
            description: String::new(),
            source: SourceSpec::Database {
                table: "orders".to_string(),
            },
            transforms: vec![TransformStep {
                op: TransformOp::Join,
                description: "join customers on customer_id".to_string(),
                tables: vec!["customers".to_string()],
            }],
            target: TargetSpec::File {
                path: "out/orders.parquet".to_string(),
                format: FileFormat::Parquet,
            },
            schedule: None,
            allow_destructive: false,
        };

        assert_eq!(spec.declared_tables(), vec!["orders", "customers"]);
        assert_eq!(spec.declared_files(), vec!["out/orders.parquet"]);
    }

    #[test]
    fn test_etl_roundtrips_through_untagged_enum() {
        let value = json!({
            "name": "p",
            "description": "d",
            "source": { "kind": "api", "url": "https://example.com/feed" },
            "transforms": [{ "op": "derive", "description": "revenue = price * qty", "tables": [] }],
            "target": { "kind": "table", "name": "feed" },
            "schedule": "@daily",
            "allow_destructive": false
        });
        let spec: PipelineSpec = serde_json::from_value(value.clone()).unwrap();
        assert!(matches!(spec, PipelineSpec::Etl(_)));
        assert_eq!(serde_json::to_value(&spec).unwrap(), value);
    }
}
