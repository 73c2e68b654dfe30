use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use abra_contracts::{AbraError, Result};
use serde_json::{json, Value};

use crate::transport::{FormRequest, HttpReply, LineStream, Transport};

pub(crate) const GUEST_HOME_PAGE: &str = concat!(
    r#"{"_js_datr":{"value":"JSDATR1","expires":1},"#,
    r#""abra_csrf":{"value":"CSRF1","expires":1},"#,
    r#"["LSD",[],{"token":"LSD1"}]"#,
);

pub(crate) const AUTHENTICATED_HOME_PAGE: &str =
    r#"["DTSGInitData",[],{"token":"DTSG1","async_get_token":"x"}]"#;

pub(crate) fn accept_terms_body(token: &str) -> String {
    json!({
        "data": {
            "xab_abra_accept_terms_of_service": {
                "new_temp_user_auth": {"access_token": token}
            }
        }
    })
    .to_string()
}

pub(crate) fn bot_record(text: &str, state: &str, extra: Value) -> String {
    let mut bot = json!({
        "streaming_state": state,
        "composed_text": {"content": [{"text": text}]},
    });
    if let (Some(target), Value::Object(extra)) = (bot.as_object_mut(), extra) {
        target.extend(extra);
    }
    json!({"data": {"node": {"bot_response_message": bot}}}).to_string()
}

pub(crate) enum Scripted {
    Reply(HttpReply),
    Lines(Vec<String>),
    Fail(&'static str),
}

/// In-memory transport that answers POSTs from a queue and records every
/// request it sees.
pub(crate) struct ScriptedTransport {
    home: HttpReply,
    downloads: HashMap<String, Vec<u8>>,
    posts: Mutex<VecDeque<Scripted>>,
    seen: Arc<Mutex<Vec<FormRequest>>>,
    home_headers: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedTransport {
    pub(crate) fn new(home_page: &str) -> Self {
        Self {
            home: HttpReply::ok(home_page),
            downloads: HashMap::new(),
            posts: Mutex::new(VecDeque::new()),
            seen: Arc::new(Mutex::new(Vec::new())),
            home_headers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn then(self, step: Scripted) -> Self {
        self.posts.lock().unwrap().push_back(step);
        self
    }

    pub(crate) fn then_body(self, body: impl Into<String>) -> Self {
        self.then(Scripted::Reply(HttpReply::ok(body)))
    }

    pub(crate) fn then_lines(self, lines: &[String]) -> Self {
        self.then(Scripted::Lines(lines.to_vec()))
    }

    pub(crate) fn with_download(mut self, url: &str, bytes: Vec<u8>) -> Self {
        self.downloads.insert(url.to_string(), bytes);
        self
    }

    pub(crate) fn requests(&self) -> Arc<Mutex<Vec<FormRequest>>> {
        Arc::clone(&self.seen)
    }

    pub(crate) fn home_headers(&self) -> Arc<Mutex<Vec<(String, String)>>> {
        Arc::clone(&self.home_headers)
    }

    fn next_step(&self, request: &FormRequest) -> Scripted {
        self.seen.lock().unwrap().push(request.clone());
        self.posts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Scripted::Fail("script exhausted"))
    }
}

impl Transport for ScriptedTransport {
    fn get_text(&self, _url: &str, headers: &[(String, String)]) -> Result<HttpReply> {
        self.home_headers.lock().unwrap().extend(headers.iter().cloned());
        Ok(self.home.clone())
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        self.downloads
            .get(url)
            .cloned()
            .ok_or_else(|| AbraError::transport(format!("GET {url} failed (404)"), "not found"))
    }

    fn post_form(&self, request: &FormRequest) -> Result<HttpReply> {
        match self.next_step(request) {
            Scripted::Reply(reply) => Ok(reply),
            Scripted::Lines(lines) => Ok(HttpReply::ok(lines.join("\n"))),
            Scripted::Fail(message) => Err(AbraError::transport("scripted", message)),
        }
    }

    fn post_form_lines(&self, request: &FormRequest) -> Result<LineStream> {
        match self.next_step(request) {
            Scripted::Reply(reply) => Ok(Box::new(
                reply
                    .body
                    .lines()
                    .map(|line| Ok(line.to_string()))
                    .collect::<Vec<_>>()
                    .into_iter(),
            )),
            Scripted::Lines(lines) => Ok(Box::new(lines.into_iter().map(Ok))),
            Scripted::Fail(message) => Err(AbraError::transport("scripted", message)),
        }
    }
}
