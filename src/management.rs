//! Administrative set management.
//!
//! Transport-agnostic: every operation returns a status code and a JSON body
//! shaped as `{"status":"OK","data":...}` or `{"status":"ERROR","message":...}`.
//! Anyone may read; creating, editing, deleting and exporting sets needs a
//! superuser.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::executor::{ExportHandle, ExportQueue};
use crate::model::{Set, SetContent};
use crate::sets::{SetError, SetRegistry};

pub const STATUS_OK: u16 = 200;
pub const STATUS_CREATED: u16 = 201;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_NOT_FOUND: u16 = 404;

/// Who is calling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    pub name: String,
    pub superuser: bool,
}

impl Requester {
    pub fn superuser(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superuser: true,
        }
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            superuser: false,
        }
    }
}

/// Body of `createSet`. `name` is ignored by `updateSet`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub definition: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok(status: u16, data: Value) -> Self {
        Self {
            status,
            body: json!({ "status": "OK", "data": data }),
        }
    }

    fn message(status: u16, message: String) -> Self {
        Self {
            status,
            body: json!({ "status": "OK", "data": { "message": message } }),
        }
    }

    pub fn data(&self) -> &Value {
        &self.body["data"]
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{status}: {message}")]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: STATUS_BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Value {
        json!({ "status": "ERROR", "message": self.message })
    }
}

impl From<SetError> for ApiError {
    fn from(e: SetError) -> Self {
        let status = match e {
            SetError::NotFound(_) => STATUS_NOT_FOUND,
            SetError::InvalidName(_)
            | SetError::InvalidDefinition { .. }
            | SetError::DuplicateSet(_) => STATUS_BAD_REQUEST,
        };
        Self {
            status,
            message: e.to_string(),
        }
    }
}

pub type ApiResult = Result<ApiResponse, ApiError>;

/// Set CRUD plus export triggering.
pub struct ManagementApi {
    registry: Arc<SetRegistry>,
    queue: ExportQueue,
}

impl ManagementApi {
    pub fn new(registry: Arc<SetRegistry>, queue: ExportQueue) -> Self {
        Self { registry, queue }
    }

    #[instrument(skip(self, request), fields(requester = %requester.name, set = %request.name))]
    pub fn create_set(&self, requester: &Requester, request: &SetRequest) -> ApiResult {
        authorize(requester, "create sets")?;
        if request.definition.trim().is_empty() {
            return Err(ApiError::bad_request("Set definition must not be empty"));
        }
        let set = self.registry.create(
            &request.name,
            &request.definition,
            request.description.as_deref(),
        )?;
        Ok(ApiResponse::ok(STATUS_CREATED, set_json(&set)))
    }

    pub fn get_set(&self, name: &str) -> ApiResult {
        let set = self.registry.get(name)?;
        let mut data = set_json(&set);
        let state = self.registry.snapshots().state(name);
        data["content"] = serde_json::to_value(state).unwrap_or(Value::Null);
        Ok(ApiResponse::ok(STATUS_OK, data))
    }

    pub fn list_sets(&self) -> ApiResult {
        let sets: Vec<Value> = self.registry.list().iter().map(set_json).collect();
        Ok(ApiResponse::ok(STATUS_OK, json!({ "oaisets": sets })))
    }

    #[instrument(skip(self, request), fields(requester = %requester.name))]
    pub fn update_set(&self, requester: &Requester, name: &str, request: &SetRequest) -> ApiResult {
        authorize(requester, "modify sets")?;
        if request.definition.trim().is_empty() {
            return Err(ApiError::bad_request("Set definition must not be empty"));
        }
        let set = self.registry.update(
            name,
            &request.definition,
            request.description.as_deref(),
        )?;
        Ok(ApiResponse::ok(STATUS_OK, set_json(&set)))
    }

    /// Deletes the set and waits for its snapshot purge.
    #[instrument(skip(self), fields(requester = %requester.name))]
    pub async fn delete_set(&self, requester: &Requester, name: &str) -> ApiResult {
        authorize(requester, "delete sets")?;
        self.registry.delete(name).await?;
        Ok(ApiResponse::message(
            STATUS_OK,
            format!("Set {name} deleted"),
        ))
    }

    /// Queues an export and returns at once. The handle may be awaited or
    /// dropped; dropping it does not cancel the export.
    #[instrument(skip(self), fields(requester = %requester.name))]
    pub fn export_set(
        &self,
        requester: &Requester,
        name: &str,
    ) -> Result<(ApiResponse, ExportHandle<Arc<SetContent>>), ApiError> {
        authorize(requester, "export sets")?;
        if !self.registry.contains(name) {
            return Err(SetError::NotFound(name.to_string()).into());
        }
        let handle = self.queue.submit(name);
        info!(set = %name, "export requested");
        Ok((
            ApiResponse::message(STATUS_OK, format!("Set {name} export launched")),
            handle,
        ))
    }
}

fn authorize(requester: &Requester, action: &str) -> Result<(), ApiError> {
    if requester.superuser {
        return Ok(());
    }
    warn!(requester = %requester.name, action, "refused non-superuser");
    Err(ApiError::bad_request(format!(
        "Only superusers can {action}"
    )))
}

fn set_json(set: &Set) -> Value {
    json!({
        "name": set.name,
        "definition": set.definition,
        "description": set.description,
    })
}
