//! Rhai-backed transform scripts.
//!
//! The script sees two variables:
//!
//! - `fields`: the plan's field definitions (constant),
//! - `data`: the current record, as an object map (read/write).
//!
//! Whatever `data` holds when the script finishes is the transform's
//! result:
//!
//! ```rhai
//! data.title = data.title.to_upper();
//! data.total = data.price * 1.2;
//! data.remove("internal_id");
//! ```
//!
//! Maps are returned with their keys sorted.
//!
//! Scripts run in an engine without module resolution or `eval`, with
//! bounded call depth and collection sizes. A progress hook checks the
//! wall-clock deadline and the caller's [`Cancellation`] while the script
//! runs, so unbounded loops are interrupted.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST, INT};
use serde_json::Value;
use tracing::Span;

use super::{Cancellation, ScriptError, Transformer};
use crate::plan::Field;

const TERMINATED_TIMEOUT: INT = 1;
const TERMINATED_CANCELLED: INT = 2;

/// How often (in operations) the progress hook checks its stop conditions.
const CHECK_EVERY_OPS: u64 = 64;

/// Resource bounds for one script run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptLimits {
    /// Hard wall-clock ceiling. `Duration::MAX` disables it; cancellation
    /// still applies.
    pub timeout: Duration,
    /// Operation budget, `0` for unlimited (the timeout still applies).
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            max_operations: 0,
            max_call_levels: 64,
            max_expr_depth: 64,
            max_string_size: 1024 * 1024,
            max_array_size: 100_000,
            max_map_size: 100_000,
        }
    }
}

/// A compiled transform script.
#[derive(Debug, Clone)]
pub struct ScriptTransformer {
    ast: Arc<AST>,
    limits: ScriptLimits,
    span: Span,
}

impl ScriptTransformer {
    /// Compile a script from source text.
    pub fn new(source: &str) -> Result<Self, ScriptError> {
        Self::with_limits(source, ScriptLimits::default())
    }

    pub fn with_limits(source: &str, limits: ScriptLimits) -> Result<Self, ScriptError> {
        let engine = sandboxed_engine(&limits);
        let ast = engine
            .compile(source)
            .map_err(|e| ScriptError::Compile(e.to_string()))?;

        Ok(Self {
            ast: Arc::new(ast),
            limits,
            span: tracing::debug_span!("script"),
        })
    }

    /// Read and compile a script file.
    pub fn from_file<P: AsRef<Path>>(path: P, limits: ScriptLimits) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let source = fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let transformer = Self::with_limits(&source, limits)?;
        tracing::debug!(parent: &transformer.span, path = %path.display(), "compiled transform script");
        Ok(transformer)
    }

    /// Emit script diagnostics (`print`, `debug`, failures) under `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn limits(&self) -> &ScriptLimits {
        &self.limits
    }

    /// Run the script on the blocking thread pool.
    pub async fn transform_async(
        &self,
        fields: Vec<Field>,
        data: Value,
        cancel: Cancellation,
    ) -> Result<Value, ScriptError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.transform(&fields, &data, &cancel))
            .await
            .map_err(|e| ScriptError::Runtime(format!("script task failed: {}", e)))?
    }

    fn run(&self, fields: &[Field], data: &Value, cancel: &Cancellation) -> Result<Value, ScriptError> {
        if cancel.is_cancelled() {
            return Err(ScriptError::Cancelled);
        }

        let started = Instant::now();
        // A timeout too large to represent means no wall-clock ceiling.
        let deadline = started.checked_add(self.limits.timeout);

        let mut engine = sandboxed_engine(&self.limits);

        let signal = cancel.clone();
        engine.on_progress(move |ops| {
            if ops % CHECK_EVERY_OPS != 0 {
                return None;
            }
            if signal.is_cancelled() {
                return Some(Dynamic::from(TERMINATED_CANCELLED));
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Some(Dynamic::from(TERMINATED_TIMEOUT));
            }
            None
        });

        let span = self.span.clone();
        engine.on_print(move |text| {
            tracing::info!(parent: &span, output = text, "script print");
        });

        let span = self.span.clone();
        engine.on_debug(move |text, source, pos| {
            tracing::debug!(
                parent: &span,
                output = text,
                source = source.unwrap_or(""),
                position = %pos,
                "script debug"
            );
        });

        let fields = rhai::serde::to_dynamic(fields)
            .map_err(|e| ScriptError::Bind(format!("fields: {}", e)))?;
        let data = rhai::serde::to_dynamic(data)
            .map_err(|e| ScriptError::Bind(format!("data: {}", e)))?;

        let mut scope = Scope::new();
        scope.push_constant_dynamic("fields", fields);
        scope.push_dynamic("data", data);

        engine
            .run_ast_with_scope(&mut scope, &self.ast)
            .map_err(|e| self.classify(*e))?;

        let data = scope
            .get_value::<Dynamic>("data")
            .ok_or_else(|| ScriptError::Output("`data` is no longer defined".to_string()))?;

        let result: Value = rhai::serde::from_dynamic(&data)
            .map_err(|e| ScriptError::Output(e.to_string()))?;

        tracing::debug!(
            parent: &self.span,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "transform script finished"
        );

        Ok(result)
    }

    fn classify(&self, error: EvalAltResult) -> ScriptError {
        match error {
            EvalAltResult::ErrorTerminated(token, _) => match token.as_int() {
                Ok(TERMINATED_CANCELLED) => ScriptError::Cancelled,
                _ => ScriptError::Timeout(self.limits.timeout),
            },
            other => ScriptError::Runtime(other.to_string()),
        }
    }
}

impl Transformer for ScriptTransformer {
    fn transform(&self, fields: &[Field], data: &Value, cancel: &Cancellation) -> Result<Value, ScriptError> {
        self.run(fields, data, cancel).map_err(|e| {
            tracing::warn!(parent: &self.span, error = %e, "transform script failed");
            e
        })
    }
}

/// Engine with no host access beyond the bound variables.
fn sandboxed_engine(limits: &ScriptLimits) -> Engine {
    let mut engine = Engine::new();

    engine.set_module_resolver(DummyModuleResolver::new());
    engine.disable_symbol("eval");

    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);

    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{FieldType, ValueKind};
    use serde_json::json;
    use std::thread;

    fn fields() -> Vec<Field> {
        vec![
            Field::new("title", FieldType::new(ValueKind::Text), "h1"),
            Field::new("price", FieldType::new(ValueKind::Decimal), ".price"),
        ]
    }

    fn quick() -> ScriptLimits {
        ScriptLimits {
            timeout: Duration::from_millis(200),
            ..ScriptLimits::default()
        }
    }

    #[test]
    fn test_script_rewrites_data() {
        let script = ScriptTransformer::new(
            r#"
            data.title = data.title.to_upper();
            data.total = data.price * 2.0;
            data.field_count = fields.len();
            data.first_field = fields[0].name;
            data.remove("secret");
            "#,
        )
        .unwrap();

        let result = script
            .transform(
                &fields(),
                &json!({"title": "hello", "price": 1.5, "secret": "x"}),
                &Cancellation::never(),
            )
            .unwrap();

        assert_eq!(
            result,
            json!({
                "field_count": 2,
                "first_field": "title",
                "price": 1.5,
                "title": "HELLO",
                "total": 3.0
            })
        );
    }

    #[test]
    fn test_data_can_be_replaced_entirely() {
        let script = ScriptTransformer::new("data = [data.a, data.a + 1];").unwrap();

        let result = script
            .transform(&fields(), &json!({"a": 1}), &Cancellation::never())
            .unwrap();

        assert_eq!(result, json!([1, 2]));
    }

    #[test]
    fn test_compile_error() {
        let err = ScriptTransformer::new("data.title = ;").unwrap_err();
        assert!(matches!(err, ScriptError::Compile(_)));
    }

    #[test]
    fn test_runtime_error() {
        let script = ScriptTransformer::new(r#"throw "boom";"#).unwrap();

        let err = script
            .transform(&fields(), &json!({}), &Cancellation::never())
            .unwrap_err();

        assert!(matches!(err, ScriptError::Runtime(ref msg) if msg.contains("boom")));
    }

    #[test]
    fn test_unbounded_loop_times_out() {
        let script = ScriptTransformer::with_limits("loop { data.n = 1; }", quick()).unwrap();

        let started = Instant::now();
        let err = script
            .transform(&fields(), &json!({}), &Cancellation::never())
            .unwrap_err();

        assert!(matches!(err, ScriptError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_caller_cancellation_interrupts() {
        let limits = ScriptLimits {
            timeout: Duration::from_secs(30),
            ..ScriptLimits::default()
        };
        let script = ScriptTransformer::with_limits("while true {}", limits).unwrap();
        let (handle, cancellation) = Cancellation::new();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.cancel();
        });

        let started = Instant::now();
        let err = script
            .transform(&fields(), &json!({}), &cancellation)
            .unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, ScriptError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_unbounded_timeout_still_runs() {
        let limits = ScriptLimits {
            timeout: Duration::MAX,
            ..ScriptLimits::default()
        };
        let script = ScriptTransformer::with_limits("data.x = 1;", limits).unwrap();

        let result = script
            .transform(&fields(), &json!({}), &Cancellation::never())
            .unwrap();

        assert_eq!(result, json!({"x": 1}));
    }

    #[test]
    fn test_unbounded_timeout_is_still_cancellable() {
        let limits = ScriptLimits {
            timeout: Duration::MAX,
            ..ScriptLimits::default()
        };
        let script = ScriptTransformer::with_limits("loop {}", limits).unwrap();
        let (handle, cancellation) = Cancellation::new();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            handle.cancel();
        });

        let err = script
            .transform(&fields(), &json!({}), &cancellation)
            .unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, ScriptError::Cancelled));
    }

    #[test]
    fn test_already_cancelled() {
        let script = ScriptTransformer::new("data.x = 1;").unwrap();
        let (handle, cancellation) = Cancellation::new();
        handle.cancel();

        let err = script
            .transform(&fields(), &json!({}), &cancellation)
            .unwrap_err();

        assert!(matches!(err, ScriptError::Cancelled));
    }

    #[test]
    fn test_no_module_access() {
        let script = ScriptTransformer::new(r#"import "std/fs" as fs; data.x = 1;"#).unwrap();

        let err = script
            .transform(&fields(), &json!({}), &Cancellation::never())
            .unwrap_err();

        assert!(matches!(err, ScriptError::Runtime(_)));
    }

    #[test]
    fn test_eval_is_disabled() {
        let result = ScriptTransformer::new(r#"eval("data.x = 1");"#).and_then(|script| {
            script.transform(&fields(), &json!({}), &Cancellation::never())
        });

        assert!(result.is_err());
    }

    #[test]
    fn test_fields_are_read_only() {
        let result = ScriptTransformer::new("fields = [];").and_then(|script| {
            script.transform(&fields(), &json!({}), &Cancellation::never())
        });

        assert!(result.is_err());
    }

    #[test]
    fn test_missing_script_file() {
        let err = ScriptTransformer::from_file("/no/such/script.rhai", ScriptLimits::default())
            .unwrap_err();
        assert!(matches!(err, ScriptError::Read { .. }));
    }

    #[tokio::test]
    async fn test_transform_async() {
        let script = ScriptTransformer::new("data.n += 1;").unwrap();

        let result = script
            .transform_async(fields(), json!({"n": 41}), Cancellation::never())
            .await
            .unwrap();

        assert_eq!(result, json!({"n": 42}));
    }

    #[tokio::test]
    async fn test_transform_async_times_out() {
        let script = ScriptTransformer::with_limits("loop {}", quick()).unwrap();

        let err = script
            .transform_async(fields(), json!({}), Cancellation::never())
            .await
            .unwrap_err();

        assert!(matches!(err, ScriptError::Timeout(_)));
    }
}
