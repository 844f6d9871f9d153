//! Extract request payload and status record types.

use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::AppError;

pub const DEFAULT_DESCRIPTION: &str = "IPUMS USA API-submitted extract";
pub const DEFAULT_SAMPLES: &[&str] = &["us2022a"];
pub const DEFAULT_VARIABLES: &[&str] = &["AGE", "SEX", "RACE", "HISPAN", "STATEFIP"];

/// How records are laid out in the produced data file.
///
/// Serializes as `{"rectangular": {"on": "P"}}` / `{"hierarchical": {}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataStructure {
    Rectangular { on: String },
    Hierarchical {},
}

impl DataStructure {
    /// Person-level rectangular records.
    pub fn person() -> Self {
        DataStructure::Rectangular { on: "P".to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    FixedWidth,
    Csv,
    Stata,
    Spss,
    Sas9,
}

/// Ordered set of identifiers serialized as a JSON object of empty option
/// objects: `{"AGE": {}, "SEX": {}}`.
///
/// The API expects objects here, not arrays. Insertion order is kept so the
/// produced file lists variables in the order they were requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionMap(Vec<String>);

impl SelectionMap {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut out: Vec<String> = Vec::new();
        for id in ids {
            let id = id.into();
            if !out.contains(&id) {
                out.push(id);
            }
        }
        Self(out)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.0
    }
}

impl Serialize for SelectionMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for id in &self.0 {
            map.serialize_entry(id, &serde_json::Map::new())?;
        }
        map.end()
    }
}

/// Extract definition submitted once via `IpumsClient::submit_extract`.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractRequest {
    pub description: String,
    pub data_structure: DataStructure,
    pub data_format: DataFormat,
    pub samples: SelectionMap,
    pub variables: SelectionMap,
}

impl ExtractRequest {
    pub fn new(
        description: impl Into<String>,
        samples: SelectionMap,
        variables: SelectionMap,
    ) -> Result<Self, AppError> {
        if samples.is_empty() {
            return Err(AppError::config("An extract needs at least one sample."));
        }
        if variables.is_empty() {
            return Err(AppError::config("An extract needs at least one variable."));
        }
        Ok(Self {
            description: description.into(),
            data_structure: DataStructure::person(),
            data_format: DataFormat::FixedWidth,
            samples,
            variables,
        })
    }
}

/// Remote lifecycle of an extract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractStatus {
    Queued,
    Started,
    Produced,
    Canceled,
    Failed,
    Completed,
    /// Anything else the API reports (including a missing status).
    Other(String),
}

impl ExtractStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "queued" => ExtractStatus::Queued,
            "started" => ExtractStatus::Started,
            "produced" => ExtractStatus::Produced,
            "canceled" => ExtractStatus::Canceled,
            "failed" => ExtractStatus::Failed,
            "completed" => ExtractStatus::Completed,
            other => ExtractStatus::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for ExtractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExtractStatus::Queued => "queued",
            ExtractStatus::Started => "started",
            ExtractStatus::Produced => "produced",
            ExtractStatus::Canceled => "canceled",
            ExtractStatus::Failed => "failed",
            ExtractStatus::Completed => "completed",
            ExtractStatus::Other(s) => s.as_str(),
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadLink {
    pub url: String,
}

/// One status record as returned by `GET /extracts/{number}`.
#[derive(Debug, Clone)]
pub struct ExtractInfo {
    pub number: Option<u64>,
    pub status: ExtractStatus,
    pub download_links: BTreeMap<String, DownloadLink>,
    /// Full response body, kept for diagnostics.
    pub raw: Value,
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    #[serde(default)]
    number: Option<Value>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    download_links: Option<BTreeMap<String, DownloadLink>>,
}

impl ExtractInfo {
    pub fn from_value(raw: Value) -> Result<Self, AppError> {
        let parsed: RawInfo = serde_json::from_value(raw.clone())
            .map_err(|e| AppError::format(format!("Unexpected extract status record: {e}: {raw}")))?;
        Ok(Self {
            number: parsed.number.as_ref().and_then(value_as_u64),
            status: ExtractStatus::parse(parsed.status.as_deref().unwrap_or("")),
            download_links: parsed.download_links.unwrap_or_default(),
            raw,
        })
    }
}

/// Pull the extract number out of a submission response body.
pub fn parse_extract_number(body: &str) -> Result<u64, AppError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| AppError::format(format!("Submission response is not JSON ({e}): {body}")))?;
    value
        .get("number")
        .and_then(value_as_u64)
        .ok_or_else(|| AppError::format(format!("Unexpected response (no 'number'): {value}")))
}

/// Accept both `123` and `"123"`.
fn value_as_u64(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
