use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{ErrorKind, SyncResult};
use crate::partition::Partition;
use crate::sync_error;
use crate::types::{Action, IdentifierKind};
use crate::upstream::{AudienceUpstream, PartialError, WireRequest, response_index};

/// Base URL of the production campaign management API.
pub const DEFAULT_CUSTOMER_LIST_BASE_URL: &str =
    "https://campaign.api.bingads.microsoft.com/CampaignManagement/v13";

/// Status used for partial errors that carry no usable code.
const DEFAULT_PARTIAL_ERROR_STATUS: u16 = 400;

/// Identifier type a customer list is keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerListIdentifierType {
    /// Hashed email addresses.
    Email,
    /// Advertiser CRM identifiers.
    CrmId,
}

impl CustomerListIdentifierType {
    fn identifier_kind(&self) -> IdentifierKind {
        match self {
            CustomerListIdentifierType::Email => IdentifierKind::Email,
            CustomerListIdentifierType::CrmId => IdentifierKind::CrmId,
        }
    }

    fn item_sub_type(&self) -> &'static str {
        match self {
            CustomerListIdentifierType::Email => "Email",
            CustomerListIdentifierType::CrmId => "CRM",
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ApplyCustomerListUserDataRequest<'a> {
    customer_list_user_data: CustomerListUserData<'a>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct CustomerListUserData<'a> {
    action_type: &'static str,
    audience_id: &'a str,
    customer_list_item_sub_type: &'static str,
    customer_list_items: Vec<&'a str>,
}

/// Customer list audience API keyed by hashed emails or CRM ids.
///
/// The list is keyed by exactly one identifier type, chosen when the upstream is created.
#[derive(Debug)]
pub struct CustomerListUpstream {
    base_url: String,
    access_token: Secret<String>,
    developer_token: Secret<String>,
    customer_id: String,
    customer_account_id: String,
    identifier_type: CustomerListIdentifierType,
}

impl CustomerListUpstream {
    pub fn new(
        access_token: Secret<String>,
        developer_token: Secret<String>,
        customer_id: impl Into<String>,
        customer_account_id: impl Into<String>,
        identifier_type: CustomerListIdentifierType,
    ) -> Self {
        Self {
            base_url: DEFAULT_CUSTOMER_LIST_BASE_URL.to_owned(),
            access_token,
            developer_token,
            customer_id: customer_id.into(),
            customer_account_id: customer_account_id.into(),
            identifier_type,
        }
    }

    /// Overrides the API base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/CustomerListUserData/Apply",
            self.base_url.trim_end_matches('/')
        )
    }
}

fn action_type(action: Action) -> &'static str {
    match action {
        Action::Add => "Add",
        Action::Remove => "Remove",
    }
}

impl AudienceUpstream for CustomerListUpstream {
    fn name(&self) -> &'static str {
        "customer_list"
    }

    fn accepts(&self, kind: IdentifierKind) -> bool {
        kind == self.identifier_type.identifier_kind()
    }

    fn build_request(&self, partition: &Partition) -> SyncResult<WireRequest> {
        let request = ApplyCustomerListUserDataRequest {
            customer_list_user_data: CustomerListUserData {
                action_type: action_type(partition.action()),
                audience_id: partition.audience_id(),
                customer_list_item_sub_type: self.identifier_type.item_sub_type(),
                customer_list_items: partition
                    .entries()
                    .iter()
                    .map(|entry| entry.identifier().value())
                    .collect(),
            },
        };

        let body = serde_json::to_value(&request).map_err(|err| {
            sync_error!(
                ErrorKind::SerializationError,
                "Failed to serialize customer list request",
                err.to_string(),
                source: err
            )
        })?;

        Ok(WireRequest::new(self.endpoint(), body)
            .with_header(
                "Authorization",
                format!("Bearer {}", self.access_token.expose_secret()),
            )
            .with_header("DeveloperToken", self.developer_token.expose_secret().as_str())
            .with_header("CustomerId", self.customer_id.as_str())
            .with_header("CustomerAccountId", self.customer_account_id.as_str()))
    }

    fn partial_errors(&self, body: &Value) -> Vec<PartialError> {
        let Some(errors) = body.get("PartialErrors").and_then(Value::as_array) else {
            return Vec::new();
        };

        errors
            .iter()
            .filter_map(|error| {
                let Some(index) = response_index(error.get("Index")) else {
                    warn!(
                        upstream = self.name(),
                        %error,
                        "ignoring partial error without a valid index"
                    );
                    return None;
                };

                let http_status = error
                    .get("Code")
                    .and_then(Value::as_u64)
                    .and_then(|code| u16::try_from(code).ok())
                    .filter(|code| *code != 0)
                    .unwrap_or(DEFAULT_PARTIAL_ERROR_STATUS);
                let error_code = error
                    .get("ErrorCode")
                    .and_then(Value::as_str)
                    .unwrap_or("UnknownError");
                let message = error
                    .get("Message")
                    .and_then(Value::as_str)
                    .unwrap_or("No error message provided");

                Some(PartialError {
                    index,
                    http_status,
                    error_code: error_code.to_owned(),
                    error_message: format!("{error_code}: {message}"),
                    body: error.clone(),
                })
            })
            .collect()
    }
}
