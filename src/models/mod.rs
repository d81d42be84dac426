use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{AsRefStr, EnumIter};

/// Backend dag-run lifecycle.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DagRunState {
    Queued,
    Running,
    Success,
    Failed,
}

impl DagRunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// `GET /api/v1/task/cmd/dag-run/{dag_id}/{dag_run_id}` and `POST .../run/{dag_id}`.
///
/// Every field is optional on the wire.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct DagRun {
    #[serde(default)]
    pub conf: serde_json::Value,
    #[serde(default)]
    pub dag_id: Option<String>,
    #[serde(default)]
    pub dag_run_id: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub execution_date: Option<String>,
    #[serde(default)]
    pub external_trigger: Option<bool>,
    #[serde(default)]
    pub logical_date: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub state: Option<DagRunState>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CommandArgument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    pub value: Option<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CommandKeywordArgument {
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub value: Option<serde_json::Value>,
}

/// Body of `POST /api/v1/task/cmd/run/{dag_id}`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CommandRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logical_date: Option<String>,
    #[serde(default)]
    pub args: Vec<CommandArgument>,
    #[serde(default)]
    pub kwargs: Vec<CommandKeywordArgument>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct GalleryAttributes {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub raw_name: Option<String>,
    #[serde(default)]
    pub uploader: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub rating: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Gallery {
    pub id: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub attributes: GalleryAttributes,
    #[serde(default)]
    pub tags: BTreeMap<String, Vec<String>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Video {
    pub id: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, Vec<String>>,
}

/// One entry of `GET /api/v1/tag/token-startswith`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TagToken {
    pub id: i64,
    pub name: String,
}
