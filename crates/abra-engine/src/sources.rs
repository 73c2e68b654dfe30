use abra_contracts::graphql::{search_sources_form, AuthField, SEARCH_SOURCES};
use abra_contracts::records::SearchResponse;
use abra_contracts::{AbraError, Result, SessionCredentials, Source};
use tracing::debug;

use crate::transport::{truncate_text, CredentialScope, FormRequest, Transport};

/// Where and how citation lookups are sent for the active credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFetcher {
    url: String,
    auth: AuthField,
    cookie: String,
    scope: CredentialScope,
}

impl SourceFetcher {
    /// Guest lookups go to the graph endpoint with the temp-user token;
    /// cookie sessions go to the API endpoint with the page DTSG token.
    pub fn new(
        credentials: &SessionCredentials,
        access_token: Option<&str>,
        api_url: &str,
        graph_url: &str,
    ) -> Result<Self> {
        if credentials.is_authenticated() {
            Ok(Self {
                url: api_url.to_string(),
                auth: AuthField::FbDtsg(credentials.fb_dtsg()?.to_string()),
                cookie: credentials.search_cookie(),
                scope: CredentialScope::Isolated,
            })
        } else {
            let token = access_token.ok_or(AbraError::MissingToken("access_token"))?;
            Ok(Self {
                url: graph_url.to_string(),
                auth: AuthField::AccessToken(token.to_string()),
                cookie: credentials.search_cookie(),
                scope: CredentialScope::Shared,
            })
        }
    }

    pub fn request(&self, fetch_id: &str) -> FormRequest {
        FormRequest::new(
            &self.url,
            SEARCH_SOURCES,
            search_sources_form(self.auth.clone(), fetch_id),
        )
        .with_cookie(&self.cookie)
        .with_scope(self.scope)
    }

    /// Looks up the citations behind `fetch_id`. Missing levels in the
    /// response mean "no sources"; HTTP failures are surfaced.
    pub fn fetch(&self, transport: &dyn Transport, fetch_id: &str) -> Result<Vec<Source>> {
        let reply = transport.post_form(&self.request(fetch_id))?;
        if !reply.is_success() {
            return Err(AbraError::transport(
                format!("citation lookup failed ({})", reply.status),
                truncate_text(&reply.body, 256),
            ));
        }
        let response: SearchResponse = serde_json::from_str(&reply.body)?;
        let sources = response.into_sources();
        debug!(fetch_id, count = sources.len(), "fetched citation sources");
        Ok(sources)
    }
}
