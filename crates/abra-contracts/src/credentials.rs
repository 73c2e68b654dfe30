use crate::error::{AbraError, Result};

/// How the client reaches the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Temporary-user access token obtained through the accept-terms flow.
    Guest,
    /// Pre-established session cookie.
    Authenticated { abra_sess: String },
}

impl AuthMode {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    /// Cookie header for the home-page fetch.
    pub fn home_cookie(&self) -> Option<String> {
        match self {
            Self::Guest => None,
            Self::Authenticated { abra_sess } => Some(format!("abra_sess={abra_sess}")),
        }
    }
}

/// Tokens embedded in the home page markup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageTokens {
    pub js_datr: Option<String>,
    pub datr: Option<String>,
    pub lsd: Option<String>,
    pub fb_dtsg: Option<String>,
}

/// Credentials for one client, replaced wholesale and never patched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCredentials {
    Guest {
        page: PageTokens,
        abra_csrf: Option<String>,
    },
    Authenticated {
        page: PageTokens,
        abra_sess: String,
    },
}

struct Delimiters {
    name: &'static str,
    start: &'static str,
    end: &'static str,
}

const JS_DATR: Delimiters = Delimiters {
    name: "_js_datr",
    start: "_js_datr\":{\"value\":\"",
    end: "\",",
};
const DATR: Delimiters = Delimiters {
    name: "datr",
    start: "datr\":{\"value\":\"",
    end: "\",",
};
const LSD: Delimiters = Delimiters {
    name: "lsd",
    start: "\"LSD\",[],{\"token\":\"",
    end: "\"}",
};
const FB_DTSG: Delimiters = Delimiters {
    name: "fb_dtsg",
    start: "DTSGInitData\",[],{\"token\":\"",
    end: "\"",
};
const ABRA_CSRF: Delimiters = Delimiters {
    name: "abra_csrf",
    start: "abra_csrf\":{\"value\":\"",
    end: "\",",
};

/// Substring between the first `start` and the next `end` after it.
pub fn extract_value<'a>(text: &'a str, start: &str, end: &str) -> Option<&'a str> {
    let from = text.find(start)? + start.len();
    let len = text[from..].find(end)?;
    Some(&text[from..from + len])
}

fn scrape(html: &str, delimiters: &Delimiters) -> Option<String> {
    extract_value(html, delimiters.start, delimiters.end)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl PageTokens {
    pub fn scrape(html: &str) -> Self {
        Self {
            js_datr: scrape(html, &JS_DATR),
            datr: scrape(html, &DATR),
            lsd: scrape(html, &LSD),
            fb_dtsg: scrape(html, &FB_DTSG),
        }
    }
}

impl SessionCredentials {
    /// Builds credentials for `mode` from the home page markup, checking that
    /// every token the mode relies on is present.
    pub fn from_home_page(html: &str, mode: &AuthMode) -> Result<Self> {
        let page = PageTokens::scrape(html);
        match mode {
            AuthMode::Guest => {
                let credentials = Self::Guest {
                    abra_csrf: scrape(html, &ABRA_CSRF),
                    page,
                };
                credentials.lsd()?;
                credentials.js_datr()?;
                credentials.datr()?;
                credentials.abra_csrf()?;
                Ok(credentials)
            }
            AuthMode::Authenticated { abra_sess } => {
                let credentials = Self::Authenticated {
                    page,
                    abra_sess: abra_sess.clone(),
                };
                credentials.fb_dtsg()?;
                Ok(credentials)
            }
        }
    }

    pub fn page(&self) -> &PageTokens {
        match self {
            Self::Guest { page, .. } | Self::Authenticated { page, .. } => page,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated { .. })
    }

    pub fn lsd(&self) -> Result<&str> {
        required(self.page().lsd.as_deref(), LSD.name)
    }

    pub fn js_datr(&self) -> Result<&str> {
        required(self.page().js_datr.as_deref(), JS_DATR.name)
    }

    pub fn datr(&self) -> Result<&str> {
        required(self.page().datr.as_deref(), DATR.name)
    }

    pub fn fb_dtsg(&self) -> Result<&str> {
        required(self.page().fb_dtsg.as_deref(), FB_DTSG.name)
    }

    pub fn abra_csrf(&self) -> Result<&str> {
        match self {
            Self::Guest { abra_csrf, .. } => required(abra_csrf.as_deref(), ABRA_CSRF.name),
            Self::Authenticated { .. } => Err(AbraError::MissingToken(ABRA_CSRF.name)),
        }
    }

    pub fn abra_sess(&self) -> Option<&str> {
        match self {
            Self::Guest { .. } => None,
            Self::Authenticated { abra_sess, .. } => Some(abra_sess),
        }
    }

    /// Cookie header for the accept-terms mutation.
    pub fn accept_terms_cookie(&self) -> Result<String> {
        Ok(format!(
            "_js_datr={}; abra_csrf={}; datr={};",
            self.js_datr()?,
            self.abra_csrf()?,
            self.datr()?
        ))
    }

    /// Cookie header for the citation lookup.
    pub fn search_cookie(&self) -> String {
        match self {
            Self::Guest { page, abra_csrf } => format!(
                "dpr=2; abra_csrf={}; datr={}; ps_n=1; ps_l=1",
                abra_csrf.as_deref().unwrap_or_default(),
                page.datr.as_deref().unwrap_or_default()
            ),
            Self::Authenticated { abra_sess, .. } => format!("abra_sess={abra_sess}"),
        }
    }
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> Result<&'a str> {
    value.ok_or(AbraError::MissingToken(name))
}
