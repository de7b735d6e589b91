//! Messages exchanged between the dispatcher and its compute units.
//!
//! `TaskRequest` and `TaskResponse` serialize to the JSON shape existing
//! compute-unit payloads expect:
//!
//! - request: `{ id, baseReferencePath, parameters, transferSupported }`
//! - response: `{ id, result }` or `{ id, error: { name, message, stack } }`

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A binary buffer that can be handed to a compute unit by reference.
pub type Transferable = Arc<[u8]>;

/// Request sent to a compute unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRequest {
    /// Dispatcher-unique task id.
    pub id: u64,
    /// Base path compute units resolve relative resources against.
    pub base_reference_path: String,
    /// Opaque task parameters.
    pub parameters: serde_json::Value,
    /// Whether buffers arrive by reference.
    pub transfer_supported: bool,
}

/// Failure reported by a compute unit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    /// Remote error kind, e.g. `"RuntimeError"`.
    pub name: String,
    /// Human-readable message.
    pub message: String,
    /// Remote stack trace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl RemoteError {
    /// Create an error without a stack trace.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            stack: None,
        }
    }

    /// Attach a stack trace.
    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// Response from a compute unit. Exactly one of `result` and `error` is
/// meaningful; `error` takes precedence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    /// Id of the request being answered.
    pub id: u64,
    /// Successful payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Failure report.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

impl TaskResponse {
    /// A successful response.
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            id,
            result: Some(result),
            error: None,
        }
    }

    /// A failed response.
    pub fn failure(id: u64, error: RemoteError) -> Self {
        Self {
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Collapse into a `Result`. A missing result means `null`.
    pub fn into_outcome(self) -> Result<serde_json::Value, RemoteError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(serde_json::Value::Null)),
        }
    }
}

/// A request together with its binary attachments, as a compute unit sees it.
#[derive(Clone, Debug)]
pub struct TaskEnvelope {
    request: TaskRequest,
    buffers: Vec<Transferable>,
    transfer_list: Vec<Transferable>,
}

impl TaskEnvelope {
    /// Wrap `request` with its buffers.
    ///
    /// With transfer support the buffers are shared by reference and all of
    /// them appear in the transfer list. Without it each buffer is copied and
    /// the transfer list stays empty.
    pub fn new(request: TaskRequest, transferables: Vec<Transferable>) -> Self {
        if request.transfer_supported {
            Self {
                request,
                buffers: transferables.clone(),
                transfer_list: transferables,
            }
        } else {
            Self {
                request,
                buffers: transferables
                    .iter()
                    .map(|buffer| Transferable::from(&buffer[..]))
                    .collect(),
                transfer_list: Vec::new(),
            }
        }
    }

    /// The request message.
    pub fn request(&self) -> &TaskRequest {
        &self.request
    }

    /// Binary attachments, in the order they were scheduled.
    pub fn buffers(&self) -> &[Transferable] {
        &self.buffers
    }

    /// Buffers handed over by reference rather than copied.
    pub fn transfer_list(&self) -> &[Transferable] {
        &self.transfer_list
    }
}

/// One-time configuration sent to every compute unit during bootstrap.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleConfig {
    /// Where the precompiled module came from, when one is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub module_path: Option<String>,
    /// Precompiled module bytes. Absent when falling back.
    #[serde(skip)]
    pub binary: Option<Transferable>,
    /// Pure-logic module to load when the binary module cannot be used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_module_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(transfer_supported: bool) -> TaskRequest {
        TaskRequest {
            id: 7,
            base_reference_path: "https://tiles.example/".to_string(),
            parameters: json!({ "tile": "0/0/0" }),
            transfer_supported,
        }
    }

    #[test]
    fn test_request_wire_format() {
        let value = serde_json::to_value(request(true)).unwrap();
        assert_eq!(
            value,
            json!({
                "id": 7,
                "baseReferencePath": "https://tiles.example/",
                "parameters": { "tile": "0/0/0" },
                "transferSupported": true
            })
        );
    }

    #[test]
    fn test_response_wire_format() {
        let ok = serde_json::to_value(TaskResponse::success(3, json!([1, 2]))).unwrap();
        assert_eq!(ok, json!({ "id": 3, "result": [1, 2] }));

        let failed = TaskResponse::failure(4, RemoteError::new("RuntimeError", "boom").with_stack("at decode"));
        assert_eq!(
            serde_json::to_value(failed).unwrap(),
            json!({
                "id": 4,
                "error": { "name": "RuntimeError", "message": "boom", "stack": "at decode" }
            })
        );
    }

    #[test]
    fn test_response_parses_from_compute_unit_json() {
        let parsed: TaskResponse =
            serde_json::from_str(r#"{"id":9,"error":{"name":"RuntimeError","message":"boom"}}"#).unwrap();
        assert_eq!(parsed.id, 9);
        assert_eq!(parsed.into_outcome(), Err(RemoteError::new("RuntimeError", "boom")));

        let null_result: TaskResponse = serde_json::from_str(r#"{"id":1,"result":null}"#).unwrap();
        assert_eq!(null_result.into_outcome(), Ok(serde_json::Value::Null));
    }

    #[test]
    fn test_envelope_shares_buffers_when_transfer_supported() {
        let buffer: Transferable = Arc::from(vec![1_u8, 2, 3]);
        let envelope = TaskEnvelope::new(request(true), vec![Arc::clone(&buffer)]);
        assert_eq!(envelope.transfer_list().len(), 1);
        assert!(Arc::ptr_eq(&envelope.buffers()[0], &buffer));
    }

    #[test]
    fn test_envelope_copies_buffers_without_transfer() {
        let buffer: Transferable = Arc::from(vec![1_u8, 2, 3]);
        let envelope = TaskEnvelope::new(request(false), vec![Arc::clone(&buffer)]);
        assert!(envelope.transfer_list().is_empty());
        assert_eq!(&envelope.buffers()[0][..], &[1, 2, 3]);
        assert!(!Arc::ptr_eq(&envelope.buffers()[0], &buffer));
    }

    #[test]
    fn test_module_config_skips_binary() {
        let config = ModuleConfig {
            module_path: Some("draco_decoder.wasm".to_string()),
            binary: Some(Arc::from(vec![0_u8, 97, 115, 109])),
            fallback_module_path: None,
        };
        assert_eq!(
            serde_json::to_value(&config).unwrap(),
            json!({ "modulePath": "draco_decoder.wasm" })
        );
    }
}
