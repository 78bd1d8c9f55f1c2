//! GraphQL wire types and operation documents.
//!
//! Operation documents are opaque typed RPC descriptors: a document string
//! goes out with variables, a typed payload comes back. Schema handling and
//! code generation are out of scope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PixaiError, Result};

/// Body of one GraphQL request: `{query, variables}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphqlRequest {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variables: Option<Value>,
}

impl GraphqlRequest {
    pub fn new(query: impl Into<String>, variables: Value) -> Self {
        Self {
            query: query.into(),
            variables: if variables.is_null() {
                None
            } else {
                Some(variables)
            },
        }
    }

    /// Whether the document is a subscription operation.
    pub fn is_subscription(&self) -> bool {
        self.query.trim_start().starts_with("subscription")
    }
}

/// A GraphQL error reported by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

/// Response body of a GraphQL request: `{data?, errors?, message?}`.
///
/// `message` with no `data` is how the gateway reports transport/auth-level
/// failures outside the GraphQL error channel.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub errors: Vec<GraphqlError>,
    #[serde(default)]
    pub message: Option<String>,
}

impl GraphqlResponse {
    /// Classify a response into a data payload or an API failure.
    ///
    /// Precedence: a top-level `message` with no data is a transport/auth
    /// failure; a non-empty errors list fails with the first error's message
    /// and the full list; otherwise the data payload is returned.
    pub(crate) fn classify(self, status: Option<u16>, raw: Option<&str>) -> Result<Value> {
        if let (Some(message), None) = (&self.message, &self.data) {
            return Err(PixaiError::Api {
                message: message.clone(),
                errors: Vec::new(),
                status,
                body: raw.map(str::to_owned),
            });
        }

        if !self.errors.is_empty() {
            return Err(PixaiError::Api {
                message: self.errors[0].message.clone(),
                errors: self.errors,
                status,
                body: raw.map(str::to_owned),
            });
        }

        match self.data {
            Some(data) => Ok(data),
            None => Err(PixaiError::Api {
                message: "GraphQL response contained no data".into(),
                errors: Vec::new(),
                status,
                body: raw.map(str::to_owned),
            }),
        }
    }
}

// ── Operation documents ─────────────────────────────────────────────

pub(crate) const CREATE_GENERATION_TASK: &str = r#"
mutation createGenerationTask($parameters: JSONObject!) {
  createGenerationTask(parameters: $parameters) {
    id
    status
    outputs
  }
}"#;

pub(crate) const GET_MEDIA_BY_ID: &str = r#"
query getMediaById($id: String!) {
  media(id: $id) {
    id
    type
    urls {
      variant
      url
    }
  }
}"#;

pub(crate) const CREATE_UPLOAD_MEDIA: &str = r#"
mutation createUploadMedia($type: String!) {
  createUploadMedia(type: $type) {
    externalId
    uploadUrl
    provider
  }
}"#;

pub(crate) const REGISTER_MEDIA: &str = r#"
mutation registerMedia($externalId: String!, $type: String!) {
  registerMedia(externalId: $externalId, type: $type) {
    id
    type
    urls {
      variant
      url
    }
  }
}"#;

pub(crate) const SUBSCRIBE_PERSONAL_EVENTS: &str = r#"
subscription subscribePersonalEvents {
  personalEvents {
    taskUpdated {
      id
      status
      outputs
    }
  }
}"#;
