//! Late-stage transformation of shaped records.
//!
//! Runs after projection, for rewrites the declarative plan cannot express.
//! The stage is optional: a pipeline without a transformer emits the
//! projected record as is.

mod cancel;
mod script;

use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;

use crate::plan::Field;

pub use cancel::{CancelHandle, Cancellation};
pub use script::{ScriptLimits, ScriptTransformer};

/// Error raised by a transform script. Always surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    #[error("failed to read script {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind script input: {0}")]
    Bind(String),

    #[error("script does not compile: {0}")]
    Compile(String),

    #[error("script failed: {0}")]
    Runtime(String),

    #[error("script exceeded its {}ms time limit", .0.as_millis())]
    Timeout(Duration),

    #[error("script was cancelled")]
    Cancelled,

    #[error("script produced unusable output: {0}")]
    Output(String),
}

/// A transformation of one record.
///
/// `data` is the projected record (or sanitized mapping) as JSON; the
/// returned value replaces it.
pub trait Transformer: Send + Sync {
    fn transform(&self, fields: &[Field], data: &Value, cancel: &Cancellation) -> Result<Value, ScriptError>;
}
