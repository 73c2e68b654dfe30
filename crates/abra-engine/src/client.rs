use std::thread;

use abra_contracts::extract::{
    check_stream_start, extract_batch, terminal_identity, BatchExtraction, RecordExtraction,
};
use abra_contracts::graphql::{
    accept_terms_form, send_message_form, AuthField, ACCEPT_TERMS, SEND_MESSAGE,
};
use abra_contracts::records::{AcceptTermsResponse, ResponseRecord};
use abra_contracts::{
    generate_offline_threading_id, AbraError, CompositeId, ConversationState, ExtractedReply,
    Result, RetryController, RetryDecision, RetryState, SessionCredentials, TranscriptEvent,
    TranscriptWriter,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::sources::SourceFetcher;
use crate::transport::{
    truncate_text, CredentialScope, FormRequest, HttpTransport, LineStream, Transport,
};

/// Conversational client for the Abra backend.
///
/// Holds the scraped session credentials, the cached guest token and the
/// conversation identity. One exchange runs at a time (`&mut self`).
pub struct MetaAiClient {
    config: ClientConfig,
    transport: Box<dyn Transport>,
    credentials: SessionCredentials,
    access_token: Option<String>,
    conversation: ConversationState,
    transcript: Option<TranscriptWriter>,
}

impl MetaAiClient {
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, Box::new(transport))
    }

    /// Fetches the home page through `transport` and scrapes the credentials
    /// the configured auth mode needs.
    pub fn with_transport(config: ClientConfig, transport: Box<dyn Transport>) -> Result<Self> {
        let mut headers = Vec::new();
        if let Some(cookie) = config.auth.home_cookie() {
            headers.push(("cookie".to_string(), cookie));
        }
        let home = transport.get_text(&config.home_url, &headers)?;
        if !home.is_success() {
            return Err(AbraError::transport(
                format!("home page fetch failed ({})", home.status),
                truncate_text(&home.body, 256),
            ));
        }
        let credentials = SessionCredentials::from_home_page(&home.body, &config.auth)?;
        debug!(
            authenticated = credentials.is_authenticated(),
            "scraped session credentials"
        );
        let conversation = config
            .conversation_id
            .clone()
            .map(ConversationState::with_external_id)
            .unwrap_or_default();
        Ok(Self {
            config,
            transport,
            credentials,
            access_token: None,
            conversation,
            transcript: None,
        })
    }

    pub fn with_transcript(mut self, transcript: TranscriptWriter) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn credentials(&self) -> &SessionCredentials {
        &self.credentials
    }

    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_authenticated()
    }

    /// Temporary-user token, requested once and cached for the client's
    /// lifetime.
    pub fn access_token(&mut self) -> Result<&str> {
        if self.access_token.is_none() {
            let token = self.request_access_token()?;
            self.access_token = Some(token);
        }
        self.access_token
            .as_deref()
            .ok_or(AbraError::MissingToken("access_token"))
    }

    fn request_access_token(&self) -> Result<String> {
        let request = FormRequest::new(
            &self.config.api_url,
            ACCEPT_TERMS,
            accept_terms_form(self.credentials.lsd()?),
        )
        .with_cookie(self.credentials.accept_terms_cookie()?)
        .with_header("sec-fetch-site", "same-origin");
        let reply = self.transport.post_form(&request)?;
        let body: Value =
            serde_json::from_str(&reply.body).map_err(|_| AbraError::region_blocked())?;
        let response: AcceptTermsResponse = serde_json::from_value(body)?;
        let token = response
            .access_token()
            .ok_or_else(|| {
                AbraError::unexpected(
                    ACCEPT_TERMS.friendly_name,
                    "response carries no temp-user access token",
                )
            })?
            .to_string();
        info!("obtained temp-user access token");
        if !self.config.token_settle_delay.is_zero() {
            thread::sleep(self.config.token_settle_delay);
        }
        Ok(token)
    }

    /// Sends `message` and waits for the completed reply, retrying while the
    /// backend returns no terminal record.
    pub fn prompt(&mut self, message: &str, new_conversation: bool) -> Result<ExtractedReply> {
        let mut retry = RetryController::new(self.config.retry_policy());
        let mut fresh = new_conversation;
        loop {
            let request = self.send_request(message, fresh)?;
            fresh = false;
            self.record_prompt(&retry, message, false);
            let outcome = self
                .transport
                .post_form(&request)
                .and_then(|reply| extract_batch(&reply.body));
            match outcome {
                Ok(batch) => return self.finish_batch(batch),
                Err(err) => self.handle_failure(&mut retry, err)?,
            }
        }
    }

    /// Sends `message` and returns the reply as it is produced. The first
    /// streamed line is validated before the stream is handed out; failures
    /// there are retried like a missing batch reply.
    pub fn prompt_stream(
        &mut self,
        message: &str,
        new_conversation: bool,
    ) -> Result<ReplyStream<'_>> {
        let mut retry = RetryController::new(self.config.retry_policy());
        let mut fresh = new_conversation;
        let (first, lines) = loop {
            let request = self.send_request(message, fresh)?;
            fresh = false;
            self.record_prompt(&retry, message, true);
            let mut lines = self.transport.post_form_lines(&request)?;
            let first_line = first_non_empty_line(&mut lines)?;
            match check_stream_start(first_line.as_deref()) {
                Ok(record) => break (record, lines),
                Err(err) => self.handle_failure(&mut retry, err)?,
            }
        };
        let sources = self.source_fetcher()?;
        Ok(ReplyStream {
            pending: Some(first),
            lines,
            finished: false,
            conversation: &mut self.conversation,
            transport: self.transport.as_ref(),
            sources,
            transcript: self.transcript.as_ref(),
        })
    }

    fn send_request(&mut self, message: &str, fresh: bool) -> Result<FormRequest> {
        let (url, auth) = if self.credentials.is_authenticated() {
            (
                self.config.api_url.clone(),
                AuthField::FbDtsg(self.credentials.fb_dtsg()?.to_string()),
            )
        } else {
            let token = self.access_token()?.to_string();
            (self.config.graph_url.clone(), AuthField::AccessToken(token))
        };

        let minted = fresh || self.conversation.external_id().is_none();
        let external_id = self.conversation.prepare(fresh).to_string();
        if minted {
            info!(conversation_id = %external_id, "starting new conversation");
        }

        let form = send_message_form(
            auth,
            message,
            &external_id,
            &generate_offline_threading_id(),
        );
        let mut request = FormRequest::new(url, SEND_MESSAGE, form);
        if let Some(abra_sess) = self.credentials.abra_sess() {
            request = request
                .with_cookie(format!("abra_sess={abra_sess}"))
                .with_scope(CredentialScope::Isolated);
        }
        Ok(request)
    }

    fn handle_failure(&self, retry: &mut RetryController, err: AbraError) -> Result<()> {
        match retry.on_failure(err) {
            RetryDecision::Retry { attempt, delay } => {
                let max_retries = retry.policy().max_retries;
                warn!(
                    "Unable to obtain a valid reply. Retrying... attempt {}/{}",
                    attempt - 1,
                    max_retries
                );
                record_event(
                    self.transcript.as_ref(),
                    TranscriptEvent::RetryScheduled {
                        attempt,
                        max_retries,
                        delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    },
                );
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                Ok(())
            }
            RetryDecision::Fail(err) => {
                record_event(
                    self.transcript.as_ref(),
                    TranscriptEvent::ExchangeFailed {
                        error: err.to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    fn record_prompt(&self, retry: &RetryController, message: &str, stream: bool) {
        let attempt = match retry.state() {
            RetryState::Attempting { attempt } => attempt,
            RetryState::Exhausted { attempts } => attempts,
        };
        record_event(
            self.transcript.as_ref(),
            TranscriptEvent::PromptSent {
                message: message.to_string(),
                stream,
                attempt,
                conversation_id: self.conversation.external_id().map(str::to_string),
            },
        );
    }

    fn finish_batch(&mut self, batch: BatchExtraction) -> Result<ExtractedReply> {
        if let Some(identity) = batch.identity.as_ref() {
            adopt_identity(&mut self.conversation, self.transcript.as_ref(), identity);
        }
        let sources = match batch.record.fetch_id.as_deref() {
            Some(fetch_id) => self.source_fetcher()?.fetch(self.transport.as_ref(), fetch_id)?,
            None => Vec::new(),
        };
        let reply = batch.record.into_reply(sources);
        record_completion(self.transcript.as_ref(), &self.conversation, &reply);
        Ok(reply)
    }

    fn source_fetcher(&self) -> Result<SourceFetcher> {
        SourceFetcher::new(
            &self.credentials,
            self.access_token.as_deref(),
            &self.config.api_url,
            &self.config.graph_url,
        )
    }
}

/// Streamed reply fragments with non-empty text, in arrival order.
///
/// Terminal records update the conversation identity and resolve their
/// citations. Only the final fragment carries sources; earlier fragments
/// yield an empty list. Dropping the stream closes the connection.
pub struct ReplyStream<'a> {
    pending: Option<ResponseRecord>,
    lines: LineStream,
    finished: bool,
    conversation: &'a mut ConversationState,
    transport: &'a dyn Transport,
    sources: SourceFetcher,
    transcript: Option<&'a TranscriptWriter>,
}

impl ReplyStream<'_> {
    fn next_record(&mut self) -> Option<Result<ResponseRecord>> {
        if let Some(record) = self.pending.take() {
            return Some(Ok(record));
        }
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(err) => return Some(Err(err)),
            };
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match ResponseRecord::parse_line(trimmed) {
                Some(record) => return Some(Ok(record)),
                None => debug!(line = %truncate_text(trimmed, 120), "skipping malformed fragment"),
            }
        }
    }

    fn materialize(&mut self, record: ResponseRecord) -> Result<Option<ExtractedReply>> {
        let extraction = RecordExtraction::from_record(&record);
        if !record.is_terminal() {
            return Ok(extraction
                .has_message()
                .then(|| extraction.into_reply(Vec::new())));
        }

        if let Some(identity) = terminal_identity(&record)? {
            adopt_identity(self.conversation, self.transcript, &identity);
        }
        if !extraction.has_message() {
            return Ok(None);
        }
        let sources = match extraction.fetch_id.as_deref() {
            Some(fetch_id) => self.sources.fetch(self.transport, fetch_id)?,
            None => Vec::new(),
        };
        let reply = extraction.into_reply(sources);
        record_completion(self.transcript, self.conversation, &reply);
        Ok(Some(reply))
    }
}

impl Iterator for ReplyStream<'_> {
    type Item = Result<ExtractedReply>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        loop {
            let record = match self.next_record() {
                Some(Ok(record)) => record,
                Some(Err(err)) => {
                    self.finished = true;
                    return Some(Err(err));
                }
                None => {
                    self.finished = true;
                    return None;
                }
            };
            match self.materialize(record) {
                Ok(Some(reply)) => return Some(Ok(reply)),
                Ok(None) => continue,
                Err(err) => {
                    self.finished = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

fn first_non_empty_line(lines: &mut LineStream) -> Result<Option<String>> {
    for line in lines.by_ref() {
        let line = line?;
        if !line.trim().is_empty() {
            return Ok(Some(line));
        }
    }
    Ok(None)
}

fn adopt_identity(
    conversation: &mut ConversationState,
    transcript: Option<&TranscriptWriter>,
    identity: &CompositeId,
) {
    if conversation.apply(identity) {
        info!(
            conversation_id = %identity.conversation_id,
            threading_id = %identity.threading_id,
            "conversation updated"
        );
        record_event(
            transcript,
            TranscriptEvent::ConversationUpdated {
                conversation_id: identity.conversation_id.clone(),
                offline_threading_id: identity.threading_id.clone(),
            },
        );
    }
}

fn record_completion(
    transcript: Option<&TranscriptWriter>,
    conversation: &ConversationState,
    reply: &ExtractedReply,
) {
    record_event(
        transcript,
        TranscriptEvent::ReplyCompleted {
            conversation_id: conversation.external_id().map(str::to_string),
            message: reply.message.clone(),
            sources: reply.sources.len(),
            media: reply.media.len(),
        },
    );
}

fn record_event(transcript: Option<&TranscriptWriter>, event: TranscriptEvent) {
    let Some(transcript) = transcript else {
        return;
    };
    if let Err(err) = transcript.record(&event) {
        warn!(event = event.kind(), error = %err, "failed to write transcript event");
    }
}
