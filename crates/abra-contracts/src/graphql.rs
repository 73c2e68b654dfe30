use serde_json::json;

pub type FormFields = Vec<(String, String)>;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
pub const CALLER_CLASS: &str = "RelayModern";

/// A persisted GraphQL operation: friendly name plus server-side document id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub friendly_name: &'static str,
    pub doc_id: &'static str,
}

pub const ACCEPT_TERMS: Operation = Operation {
    friendly_name: "useAbraAcceptTOSForTempUserMutation",
    doc_id: "7604648749596940",
};

pub const SEND_MESSAGE: Operation = Operation {
    friendly_name: "useAbraSendMessageMutation",
    doc_id: "7783822248314888",
};

pub const SEARCH_SOURCES: Operation = Operation {
    friendly_name: "AbraSearchPluginDialogQuery",
    doc_id: "6946734308765963",
};

/// Field that authorizes a request: a temporary-user token for guests, the
/// page's DTSG token for cookie sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthField {
    AccessToken(String),
    FbDtsg(String),
}

impl AuthField {
    fn into_pair(self) -> (String, String) {
        match self {
            Self::AccessToken(token) => ("access_token".to_string(), token),
            Self::FbDtsg(token) => ("fb_dtsg".to_string(), token),
        }
    }
}

fn base_fields(operation: Operation) -> FormFields {
    vec![
        ("fb_api_caller_class".to_string(), CALLER_CLASS.to_string()),
        (
            "fb_api_req_friendly_name".to_string(),
            operation.friendly_name.to_string(),
        ),
    ]
}

pub fn accept_terms_form(lsd: &str) -> FormFields {
    let mut fields = vec![("lsd".to_string(), lsd.to_string())];
    fields.extend(base_fields(ACCEPT_TERMS));
    fields.push((
        "variables".to_string(),
        json!({
            "dob": "1999-01-01",
            "icebreaker_type": "TEXT",
            "__relay_internal__pv__WebPixelRatiorelayprovider": 1,
        })
        .to_string(),
    ));
    fields.push(("doc_id".to_string(), ACCEPT_TERMS.doc_id.to_string()));
    fields
}

pub fn send_message_form(
    auth: AuthField,
    message: &str,
    external_conversation_id: &str,
    offline_threading_id: &str,
) -> FormFields {
    let mut fields = vec![auth.into_pair()];
    fields.extend(base_fields(SEND_MESSAGE));
    fields.push((
        "variables".to_string(),
        json!({
            "message": {"sensitive_string_value": message},
            "externalConversationId": external_conversation_id,
            "offlineThreadingId": offline_threading_id,
            "suggestedPromptIndex": null,
            "flashVideoRecapInput": {"images": []},
            "flashPreviewInput": null,
            "promptPrefix": null,
            "entrypoint": "ABRA__CHAT__TEXT",
            "icebreaker_type": "TEXT",
            "__relay_internal__pv__AbraDebugDevOnlyrelayprovider": false,
            "__relay_internal__pv__WebPixelRatiorelayprovider": 1,
        })
        .to_string(),
    ));
    fields.push(("server_timestamps".to_string(), "true".to_string()));
    fields.push(("doc_id".to_string(), SEND_MESSAGE.doc_id.to_string()));
    fields
}

pub fn search_sources_form(auth: AuthField, fetch_id: &str) -> FormFields {
    let mut fields = vec![auth.into_pair()];
    fields.extend(base_fields(SEARCH_SOURCES));
    fields.push((
        "variables".to_string(),
        json!({ "abraMessageFetchID": fetch_id }).to_string(),
    ));
    fields.push(("server_timestamps".to_string(), "true".to_string()));
    fields.push(("doc_id".to_string(), SEARCH_SOURCES.doc_id.to_string()));
    fields
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn field<'a>(fields: &'a FormFields, key: &str) -> Option<&'a str> {
        fields
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }

    #[test]
    fn send_message_carries_conversation_and_auth() {
        let fields = send_message_form(
            AuthField::AccessToken("tok".to_string()),
            "hello",
            "conv-1",
            "123",
        );
        assert_eq!(field(&fields, "access_token"), Some("tok"));
        assert_eq!(field(&fields, "fb_dtsg"), None);
        assert_eq!(
            field(&fields, "fb_api_req_friendly_name"),
            Some(SEND_MESSAGE.friendly_name)
        );
        assert_eq!(field(&fields, "doc_id"), Some(SEND_MESSAGE.doc_id));

        let variables: Value = serde_json::from_str(field(&fields, "variables").unwrap()).unwrap();
        assert_eq!(variables["message"]["sensitive_string_value"], "hello");
        assert_eq!(variables["externalConversationId"], "conv-1");
        assert_eq!(variables["offlineThreadingId"], "123");
        assert_eq!(variables["entrypoint"], "ABRA__CHAT__TEXT");
        assert!(variables["promptPrefix"].is_null());
    }

    #[test]
    fn authenticated_send_uses_dtsg() {
        let fields = send_message_form(AuthField::FbDtsg("dtsg".to_string()), "hi", "c", "1");
        assert_eq!(field(&fields, "fb_dtsg"), Some("dtsg"));
        assert_eq!(field(&fields, "access_token"), None);
    }

    #[test]
    fn accept_terms_variables_are_json() {
        let fields = accept_terms_form("lsd-token");
        assert_eq!(field(&fields, "lsd"), Some("lsd-token"));
        let variables: Value = serde_json::from_str(field(&fields, "variables").unwrap()).unwrap();
        assert_eq!(variables["dob"], "1999-01-01");
        assert_eq!(field(&fields, "doc_id"), Some(ACCEPT_TERMS.doc_id));
    }

    #[test]
    fn search_form_embeds_fetch_id() {
        let fields = search_sources_form(AuthField::AccessToken("tok".to_string()), "fetch-9");
        let variables: Value = serde_json::from_str(field(&fields, "variables").unwrap()).unwrap();
        assert_eq!(variables["abraMessageFetchID"], "fetch-9");
        assert_eq!(
            field(&fields, "fb_api_req_friendly_name"),
            Some(SEARCH_SOURCES.friendly_name)
        );
    }
}
