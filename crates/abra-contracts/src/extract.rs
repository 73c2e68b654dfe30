use tracing::debug;

use crate::conversation::CompositeId;
use crate::error::{AbraError, Result};
use crate::records::{BotResponseMessage, ResponseRecord};
use crate::reply::{ExtractedReply, MediaItem, Source};

/// Everything a single record carries, minus the citations that need a
/// follow-up request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordExtraction {
    pub message: String,
    pub fetch_id: Option<String>,
    pub media: Vec<MediaItem>,
}

impl RecordExtraction {
    pub fn from_record(record: &ResponseRecord) -> Self {
        let Some(bot) = record.bot_response() else {
            return Self::default();
        };
        Self {
            message: format_response(bot),
            fetch_id: bot
                .fetch_id
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string),
            media: extract_media(bot),
        }
    }

    pub fn has_message(&self) -> bool {
        !self.message.is_empty()
    }

    pub fn into_reply(self, sources: Vec<Source>) -> ExtractedReply {
        ExtractedReply {
            message: self.message,
            sources,
            media: self.media,
        }
    }
}

/// Result of scanning a buffered response.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchExtraction {
    pub identity: Option<CompositeId>,
    pub record: RecordExtraction,
}

/// Display text of a bot message: every composed text block followed by a
/// newline.
pub fn format_response(bot: &BotResponseMessage) -> String {
    bot.composed_text
        .as_ref()
        .and_then(|composed| composed.content.as_ref())
        .map(|blocks| {
            blocks
                .iter()
                .filter_map(|block| block.text.as_deref())
                .fold(String::new(), |mut out, text| {
                    out.push_str(text);
                    out.push('\n');
                    out
                })
        })
        .unwrap_or_default()
}

pub fn extract_media(bot: &BotResponseMessage) -> Vec<MediaItem> {
    let Some(media_sets) = bot
        .imagine_card
        .as_ref()
        .and_then(|card| card.session.as_ref())
        .and_then(|session| session.media_sets.as_ref())
    else {
        return Vec::new();
    };
    media_sets
        .iter()
        .filter_map(|set| set.imagine_media.as_ref())
        .flatten()
        .map(|media| MediaItem {
            url: media.uri.clone(),
            media_type: media.media_type.clone(),
            prompt: media.prompt.clone(),
        })
        .collect()
}

/// Last record in document order whose bot response is marked terminal.
pub fn last_terminal_record(raw: &str) -> Option<ResponseRecord> {
    let mut last = None;
    for (idx, line) in raw.split('\n').enumerate() {
        let Some(record) = ResponseRecord::parse_line(line) else {
            if !line.trim().is_empty() {
                debug!(line = idx, "skipping unparseable response line");
            }
            continue;
        };
        if record.is_terminal() {
            last = Some(record);
        }
    }
    last
}

/// Decodes the identity of a terminal record. A record without an `id` leaves
/// the conversation untouched; a malformed one is an error.
pub fn terminal_identity(record: &ResponseRecord) -> Result<Option<CompositeId>> {
    match record
        .bot_response()
        .and_then(|bot| bot.id.as_deref())
        .filter(|id| !id.is_empty())
    {
        Some(raw) => CompositeId::parse(raw).map(Some),
        None => Ok(None),
    }
}

pub fn extract_batch(raw: &str) -> Result<BatchExtraction> {
    let record = last_terminal_record(raw).ok_or(AbraError::NoTerminalResponse)?;
    Ok(BatchExtraction {
        identity: terminal_identity(&record)?,
        record: RecordExtraction::from_record(&record),
    })
}

/// Validates the first line of a streamed reply. Backend-reported errors, a
/// line that is not a JSON object, or a missing line are all retryable.
pub fn check_stream_start(first_line: Option<&str>) -> Result<ResponseRecord> {
    let Some(line) = first_line else {
        return Err(AbraError::stream_start("stream closed before the first line"));
    };
    let record = ResponseRecord::parse_line(line)
        .ok_or_else(|| AbraError::stream_start("first line is not a JSON object"))?;
    let errors = record.errors();
    if !errors.is_empty() {
        let summary = errors
            .iter()
            .filter_map(|err| err.get("message").and_then(|value| value.as_str()))
            .collect::<Vec<_>>()
            .join("; ");
        return Err(AbraError::stream_start(if summary.is_empty() {
            format!("{} error(s)", errors.len())
        } else {
            summary
        }));
    }
    Ok(record)
}
