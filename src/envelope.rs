//! Reply envelope model and encoder.
//!
//! Every reply published by the worker is one [`Envelope`]. Field order is
//! part of the wire contract, `status` serializes as its label, and `result`
//! and `error` are explicit nulls when absent.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Processing state carried by a reply envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    /// The result sequence completed; no further replies follow.
    Done,
    /// An intermediate result element is attached.
    Processing,
    /// The invocation failed; `error` says why.
    Error,
}

/// One reply message published to the caller's reply queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// The decoded request body, echoed verbatim.
    pub request: Value,
    /// Result element on PROCESSING replies, null otherwise.
    pub result: Option<Value>,
    /// Processing state.
    pub status: Status,
    /// Failure description on ERROR replies, null otherwise.
    pub error: Option<String>,
    /// Sequence number within one invocation.
    pub num: u64,
}

impl Envelope {
    /// Intermediate reply carrying the `num`-th result element.
    pub fn processing(request: Value, result: Value, num: u64) -> Self {
        Self {
            request,
            result: Some(result),
            status: Status::Processing,
            error: None,
            num,
        }
    }

    /// Terminal reply after a sequence of `num` elements.
    pub fn done(request: Value, num: u64) -> Self {
        Self {
            request,
            result: None,
            status: Status::Done,
            error: None,
            num,
        }
    }

    /// Terminal failure reply; `num` is always zero.
    pub fn error(request: Value, error: impl Into<String>) -> Self {
        Self {
            request,
            result: None,
            status: Status::Error,
            error: Some(error.into()),
            num: 0,
        }
    }

    /// Encode as UTF-8 JSON.
    ///
    /// # Errors
    ///
    /// Returns the underlying serializer error, which does not happen for
    /// envelopes built from decoded JSON values.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}
