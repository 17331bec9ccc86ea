//! End-to-end run of a plan over harvested documents.
//!
//! For each harvested document:
//!
//! 1. conform every declared field (regex, normalize, convert),
//! 2. project the sanitized mapping into the plan's record shape,
//! 3. run the optional transform on the projected record.
//!
//! The first two steps never fail on bad input; only the transform stage
//! produces per-document errors, and what happens then is chosen by the
//! caller through [`ScriptFailurePolicy`].

use std::sync::Arc;

use serde_json::Value;
use tracing::Span;

use crate::conform::Conformer;
use crate::harvest::{HarvestError, Harvested, Harvester};
use crate::plan::{Field, Plan, PlanError};
use crate::record::Sanitized;
use crate::schema::{ProjectionError, RecordSchema};
use crate::transform::{Cancellation, ScriptError, ScriptLimits, ScriptTransformer, Transformer};

/// Error type for pipeline runs
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Harvest(#[from] HarvestError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error(transparent)]
    Script(#[from] ScriptError),
}

/// What to do with a document whose transform script fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScriptFailurePolicy {
    /// Abort the run with the script error.
    #[default]
    Fail,
    /// Log the error and emit the untransformed record.
    KeepRecord,
}

/// A plan compiled for repeated runs.
#[derive(Clone)]
pub struct Pipeline {
    fields: Vec<Field>,
    conformer: Conformer,
    schema: RecordSchema,
    transformer: Option<Arc<dyn Transformer>>,
    /// Set when the transformer is a script, so it can be re-parented.
    script: Option<ScriptTransformer>,
    on_script_error: ScriptFailurePolicy,
    project: bool,
    span: Span,
}

impl Pipeline {
    /// Validate `plan` and compile its fields. No transform is attached.
    pub fn new(plan: &Plan) -> Result<Self, PipelineError> {
        plan.validate()?;

        let span = tracing::info_span!("pipeline", source = %plan.source);

        Ok(Self {
            fields: plan.fields.clone(),
            conformer: Conformer::with_span(&plan.fields, span.clone()),
            schema: RecordSchema::from_fields(&plan.fields),
            transformer: None,
            script: None,
            on_script_error: ScriptFailurePolicy::default(),
            project: true,
            span,
        })
    }

    /// Like [`Pipeline::new`], also compiling the plan's `transformer`
    /// script when it names one.
    pub fn from_plan(plan: &Plan, limits: ScriptLimits) -> Result<Self, PipelineError> {
        let pipeline = Self::new(plan)?;

        match &plan.transformer {
            Some(path) => {
                let script = ScriptTransformer::from_file(path, limits)?;
                Ok(pipeline.with_script(script))
            }
            None => Ok(pipeline),
        }
    }

    pub fn with_transformer<T: Transformer + 'static>(mut self, transformer: T) -> Self {
        self.transformer = Some(Arc::new(transformer));
        self.script = None;
        self
    }

    /// Attach a script, routing its diagnostics under the pipeline span.
    pub fn with_script(mut self, script: ScriptTransformer) -> Self {
        self.attach_script(script);
        self
    }

    fn attach_script(&mut self, script: ScriptTransformer) {
        let span = tracing::debug_span!(parent: &self.span, "script");
        self.transformer = Some(Arc::new(script.clone().with_span(span)));
        self.script = Some(script);
    }

    pub fn with_failure_policy(mut self, policy: ScriptFailurePolicy) -> Self {
        self.on_script_error = policy;
        self
    }

    /// When `false`, the sanitized mapping is emitted (and transformed)
    /// instead of the projected record.
    pub fn with_projection(mut self, project: bool) -> Self {
        self.project = project;
        self
    }

    /// Emit every diagnostic of this pipeline under `span`, including
    /// those of a script attached earlier.
    pub fn with_span(mut self, span: Span) -> Self {
        self.conformer = Conformer::with_span(&self.fields, span.clone());
        self.span = span;
        if let Some(script) = self.script.take() {
            self.attach_script(script);
        }
        self
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn conformer(&self) -> &Conformer {
        &self.conformer
    }

    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    pub fn has_transformer(&self) -> bool {
        self.transformer.is_some()
    }

    /// Conform one harvested document.
    pub fn sanitize(&self, harvested: &Harvested) -> Sanitized {
        self.conformer.conform(harvested)
    }

    /// Conform and shape one document, without the transform stage.
    pub fn shape(&self, harvested: &Harvested) -> Result<Value, PipelineError> {
        let sanitized = self.sanitize(harvested);

        let value = if self.project {
            let record = self.schema.project(&sanitized)?;
            serde_json::to_value(&record).map_err(ProjectionError::Encode)?
        } else {
            serde_json::to_value(&sanitized).map_err(ProjectionError::Encode)?
        };

        Ok(value)
    }

    /// Run every stage on one harvested document.
    pub fn run(&self, harvested: &Harvested, cancel: &Cancellation) -> Result<Value, PipelineError> {
        let shaped = self.shape(harvested)?;

        let Some(transformer) = &self.transformer else {
            return Ok(shaped);
        };

        match transformer.transform(&self.fields, &shaped, cancel) {
            Ok(transformed) => Ok(transformed),
            Err(ScriptError::Cancelled) => Err(ScriptError::Cancelled.into()),
            Err(e) => match self.on_script_error {
                ScriptFailurePolicy::Fail => Err(e.into()),
                ScriptFailurePolicy::KeepRecord => {
                    tracing::warn!(parent: &self.span, error = %e, "keeping untransformed record");
                    Ok(shaped)
                }
            },
        }
    }

    /// Run every stage on each document, stopping at the first error.
    pub fn run_all(&self, documents: &[Harvested], cancel: &Cancellation) -> Result<Vec<Value>, PipelineError> {
        let mut out = Vec::with_capacity(documents.len());

        for (index, document) in documents.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(ScriptError::Cancelled.into());
            }

            tracing::debug!(parent: &self.span, document = index, "processing document");
            out.push(self.run(document, cancel)?);
        }

        tracing::info!(parent: &self.span, documents = out.len(), "pipeline finished");

        Ok(out)
    }

    /// Harvest `plan` with `harvester`, then run every document.
    pub fn harvest_and_run(
        &self,
        harvester: &dyn Harvester,
        plan: &Plan,
        cancel: &Cancellation,
    ) -> Result<Vec<Value>, PipelineError> {
        if harvester.kind() != plan.harvester {
            tracing::debug!(
                parent: &self.span,
                harvester = harvester.kind(),
                requested = %plan.harvester,
                "harvester kind differs from the plan's"
            );
        }

        let documents = harvester.harvest(plan)?;
        tracing::debug!(parent: &self.span, documents = documents.len(), "harvesting done");

        self.run_all(&documents, cancel)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("fields", &self.fields.len())
            .field("transformer", &self.transformer.is_some())
            .field("on_script_error", &self.on_script_error)
            .field("project", &self.project)
            .finish()
    }
}
