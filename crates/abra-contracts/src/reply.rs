use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A fully or partially materialized bot reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedReply {
    pub message: String,
    pub sources: Vec<Source>,
    pub media: Vec<MediaItem>,
}

/// Generated media attached to a reply (imagine cards).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MediaItem {
    pub url: Option<String>,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub prompt: Option<String>,
}

/// Citation reference returned by the search plugin. Fields other than
/// `title`/`link` are kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Source {
    #[serde(
        default,
        deserialize_with = "crate::records::lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub title: Option<String>,
    #[serde(
        default,
        deserialize_with = "crate::records::lenient_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub link: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
