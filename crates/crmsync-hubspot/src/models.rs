//! Wire shapes of the HubSpot CRM v3 and OAuth v1 endpoints

use serde::{Deserialize, Serialize};

use crmsync_api::{CreateContactInput, RemoteContactRecord, TokenGrant};

/// One page of `GET /crm/v3/objects/contacts`
#[derive(Debug, Clone, Deserialize)]
pub struct ContactsPage {
    #[serde(default)]
    pub results: Vec<RemoteContactRecord>,
    #[serde(default)]
    pub paging: Option<Paging>,
}

impl ContactsPage {
    /// Cursor of the next page, if there is one
    pub fn next_after(&self) -> Option<&str> {
        self.paging
            .as_ref()
            .and_then(|p| p.next.as_ref())
            .map(|n| n.after.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Paging {
    pub next: Option<NextPage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NextPage {
    pub after: String,
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdInput {
    pub id: String,
}

/// Body of `POST /crm/v3/objects/contacts/batch/read`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReadBody {
    pub id_property: String,
    pub inputs: Vec<IdInput>,
    pub properties: Vec<String>,
}

/// Body of `POST /crm/v3/objects/contacts/batch/create`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchCreateBody {
    pub inputs: Vec<CreateContactInput>,
}

/// `POST /oauth/v1/token` response
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl From<TokenResponse> for TokenGrant {
    fn from(response: TokenResponse) -> Self {
        TokenGrant {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_in: response.expires_in,
        }
    }
}

/// `GET /account-info/v3/details` response (only what is used)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub portal_id: u64,
}

/// Error body returned by HubSpot on non-2xx responses
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(default)]
    pub status: Option<String>,
    pub message: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub correlation_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crmsync_api::BatchReadRequest;

    #[test]
    fn test_page_with_cursor() {
        let json = r#"{
            "results": [{"id": "51", "properties": {"email": "a@x.com"}, "archived": false}],
            "paging": {"next": {"after": "52", "link": "https://api.hubapi.com/crm/v3/objects/contacts?after=52"}}
        }"#;
        let page: ContactsPage = serde_json::from_str(json).unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.next_after(), Some("52"));
    }

    #[test]
    fn test_last_page_has_no_cursor() {
        let page: ContactsPage = serde_json::from_str(r#"{"results": []}"#).unwrap();
        assert_eq!(page.next_after(), None);
    }

    #[test]
    fn test_batch_read_body_shape() {
        let request = BatchReadRequest::by_email(vec!["a@x.com".into()]);
        let body = BatchReadBody {
            id_property: request.id_property,
            inputs: request.ids.into_iter().map(|id| IdInput { id }).collect(),
            properties: request.properties,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["idProperty"], "email");
        assert_eq!(json["inputs"][0]["id"], "a@x.com");
        assert_eq!(json["properties"][1], "firstname");
    }

    #[test]
    fn test_token_response_into_grant() {
        let json = r#"{"token_type": "bearer", "refresh_token": "r", "access_token": "a", "expires_in": 1800}"#;
        let grant: TokenGrant = serde_json::from_str::<TokenResponse>(json).unwrap().into();
        assert_eq!(grant.access_token, "a");
        assert_eq!(grant.expires_in, 1800);
    }

    #[test]
    fn test_account_info_portal_id() {
        let info: AccountInfo =
            serde_json::from_str(r#"{"portalId": 12345, "timeZone": "US/Eastern"}"#).unwrap();
        assert_eq!(info.portal_id, 12345);
    }
}
