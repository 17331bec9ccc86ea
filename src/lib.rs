//! # Harvit: plan-driven conformance of harvested text
//!
//! Harvit turns loosely structured text located in a document (a page, a
//! feed, an API response) into typed records whose shape is declared by a
//! YAML plan.
//!
//! ## Features
//!
//! - **Field type system**: `raw`, `text`, `number`, `decimal` and `datetime`
//!   conversions, plus `_list` variants, resolved once per field
//! - **Regex pre-extraction and normalization**: narrow a raw value to its
//!   first capturing group, strip numeric noise
//! - **Schema projection**: shape a generic mapping into a record with
//!   exactly the plan's properties, zero-filling the gaps
//! - **Transform scripts**: optional, sandboxed Rhai scripts with a hard
//!   time limit and caller cancellation
//!
//! Fetching documents and locating values with selectors is left to a
//! [`Harvester`] implementation.
//!
//! ## Example
//!
//! ```yaml
//! source: https://example.com/products/42
//! fields:
//!   - name: title
//!     type: text
//!     selector: "#app > h1"
//!   - name: numberWithText
//!     type: number
//!     selector: "#app > .number"
//!   - name: publishedAt
//!     type: datetime
//!     selector: "#app > time"
//!     format: d/m/Y H:i:s
//! ```
//!
//! ```no_run
//! use harvit::{Cancellation, Harvested, Pipeline, Plan, RawValue};
//!
//! let plan = Plan::load_from_file("plan.yml")?;
//! let pipeline = Pipeline::new(&plan)?;
//!
//! let mut harvested = Harvested::new();
//! harvested.insert("numberWithText".into(), RawValue::from("This is some leet number: 1337"));
//!
//! let record = pipeline.run(&harvested, &Cancellation::never())?;
//! assert_eq!(record["number_with_text"], 1337);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Core modules
pub mod convert;
pub mod conform;
pub mod schema;
pub mod transform;

// Plan, values and harvesting interface
pub mod plan;
pub mod record;
pub mod harvest;

// Orchestration and output
pub mod pipeline;
pub mod serialization;

// Ambient configuration
pub mod config;
pub mod telemetry;

// Re-export key types
pub use convert::{Converter, FieldType, ValueKind};
pub use conform::{conform, Conformer, FieldRule};
pub use schema::{Cardinality, Property, ProjectionError, RecordSchema};
pub use transform::{CancelHandle, Cancellation, ScriptError, ScriptLimits, ScriptTransformer, Transformer};

pub use plan::{Field, Plan, PlanError};
pub use record::{FieldValue, Record, Sanitized};
pub use harvest::{HarvestError, Harvested, Harvester, RawValue, StaticHarvester};

pub use pipeline::{Pipeline, PipelineError, ScriptFailurePolicy};
pub use serialization::{JsonArrayWriter, NdjsonWriter, SerializationError};
pub use config::{ConfigError, Settings};
