//! Typed views over the GraphQL payloads the backend returns.
//!
//! Every level is optional: an absent, `null` or off-type value deserializes
//! to `None` and callers treat that as "nothing here" rather than a failure.
//! Only a line that is not a JSON object at all is rejected.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::reply::Source;

pub const OVERALL_DONE: &str = "OVERALL_DONE";

/// One newline-delimited record of a send-message response.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseRecord {
    #[serde(default, deserialize_with = "lenient")]
    pub data: Option<RecordData>,
    #[serde(default)]
    pub errors: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordData {
    #[serde(default, deserialize_with = "lenient")]
    pub node: Option<RecordNode>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordNode {
    #[serde(default, deserialize_with = "lenient")]
    pub bot_response_message: Option<BotResponseMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotResponseMessage {
    #[serde(default, deserialize_with = "lenient_text")]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub streaming_state: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub fetch_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub composed_text: Option<ComposedText>,
    #[serde(default, deserialize_with = "lenient")]
    pub imagine_card: Option<ImagineCard>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComposedText {
    #[serde(default, deserialize_with = "lenient_list")]
    pub content: Option<Vec<ComposedTextBlock>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComposedTextBlock {
    #[serde(default, deserialize_with = "lenient_text")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImagineCard {
    #[serde(default, deserialize_with = "lenient")]
    pub session: Option<ImagineSession>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImagineSession {
    #[serde(default, deserialize_with = "lenient_list")]
    pub media_sets: Option<Vec<MediaSet>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MediaSet {
    #[serde(default, deserialize_with = "lenient_list")]
    pub imagine_media: Option<Vec<ImagineMedia>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImagineMedia {
    #[serde(default, deserialize_with = "lenient_text")]
    pub uri: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub media_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub prompt: Option<String>,
}

impl ResponseRecord {
    /// Parses one line; anything that is not a JSON object yields `None`.
    pub fn parse_line(line: &str) -> Option<Self> {
        let value: Value = serde_json::from_str(line).ok()?;
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value).ok()
    }

    pub fn bot_response(&self) -> Option<&BotResponseMessage> {
        self.data
            .as_ref()
            .and_then(|data| data.node.as_ref())
            .and_then(|node| node.bot_response_message.as_ref())
    }

    pub fn is_terminal(&self) -> bool {
        self.bot_response()
            .and_then(|message| message.streaming_state.as_deref())
            == Some(OVERALL_DONE)
    }

    /// Backend-reported errors. A bare object counts as a single error.
    pub fn errors(&self) -> Vec<&Value> {
        match &self.errors {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items.iter().collect(),
            Some(other) => vec![other],
        }
    }
}

/// Decodes a nested level, treating a value of the wrong shape as absent.
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| serde_json::from_value(value).ok()))
}

/// Decodes a list, dropping entries of the wrong shape.
pub(crate) fn lenient_list<'de, D, T>(deserializer: D) -> Result<Option<Vec<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
        ),
        _ => None,
    })
}

/// Decodes a text leaf. Numbers keep their decimal form; other shapes are
/// absent.
pub(crate) fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

/// Response of the search-plugin query used to materialize citations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub data: Option<SearchData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchData {
    #[serde(default, deserialize_with = "lenient")]
    pub message: Option<SearchMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchMessage {
    #[serde(rename = "searchResults", default, deserialize_with = "lenient")]
    pub search_results: Option<SearchResults>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResults {
    #[serde(default, deserialize_with = "lenient_list")]
    pub references: Option<Vec<Source>>,
}

impl SearchResponse {
    pub fn into_sources(self) -> Vec<Source> {
        self.data
            .and_then(|data| data.message)
            .and_then(|message| message.search_results)
            .and_then(|results| results.references)
            .unwrap_or_default()
    }
}

/// Response of the temporary-user accept-terms mutation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcceptTermsResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub data: Option<AcceptTermsData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcceptTermsData {
    #[serde(default, deserialize_with = "lenient")]
    pub xab_abra_accept_terms_of_service: Option<AcceptTermsResult>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AcceptTermsResult {
    #[serde(default, deserialize_with = "lenient")]
    pub new_temp_user_auth: Option<TempUserAuth>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TempUserAuth {
    #[serde(default, deserialize_with = "lenient_text")]
    pub access_token: Option<String>,
}

impl AcceptTermsResponse {
    pub fn access_token(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.xab_abra_accept_terms_of_service.as_ref())
            .and_then(|result| result.new_temp_user_auth.as_ref())
            .and_then(|auth| auth.access_token.as_deref())
            .filter(|token| !token.is_empty())
    }
}
