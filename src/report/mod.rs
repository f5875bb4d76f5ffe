//! The result reporter: a built-in pair of lifecycle hooks that renders each
//! run on a [`Console`], optionally writes the `{result, message, status}`
//! artifact and re-checks the returned value against the declared return
//! type.

pub mod console;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::action::{ActionDescriptor, Status};
use crate::error::{ReportError, ReportWarning};
use crate::hooks::{HookRegistration, LifecycleHooks};
use crate::types::json_kind;

pub use console::{Console, MessageKind, SharedBuffer, HEADER_WIDTH};

#[derive(Debug)]
struct ReporterState {
    msg_len_target: usize,
    warnings: Vec<ReportWarning>,
}

/// Renders runs and persists their outcome. Clones share state.
#[derive(Debug, Clone)]
pub struct ResultReporter {
    print_result: bool,
    json_output: Option<PathBuf>,
    console: Console,
    state: Arc<Mutex<ReporterState>>,
}

/// Keeps both reporter hooks registered.
#[must_use = "the reporter stops reporting as soon as the registration is dropped"]
pub struct ReporterRegistration {
    _before: HookRegistration,
    _after: HookRegistration,
}

impl ResultReporter {
    pub fn new(console: Console) -> Self {
        Self {
            print_result: false,
            json_output: None,
            console,
            state: Arc::new(Mutex::new(ReporterState {
                msg_len_target: HEADER_WIDTH,
                warnings: Vec::new(),
            })),
        }
    }

    /// Print the result as indented JSON after a run that produced one.
    pub fn print_result(mut self, print_result: bool) -> Self {
        self.print_result = print_result;
        self
    }

    /// Write the machine-readable artifact of every run to `path`.
    pub fn json_output(mut self, path: Option<PathBuf>) -> Self {
        self.json_output = path;
        self
    }

    /// Registers the reporter on `hooks` for as long as the returned guard
    /// lives.
    pub fn register(&self, hooks: &LifecycleHooks) -> ReporterRegistration {
        let before = self.clone();
        let after = self.clone();
        ReporterRegistration {
            _before: hooks.before_run(move |d| before.before_run(d)),
            _after: hooks.after_run(move |d| after.after_run(d)),
        }
    }

    /// Diagnostics raised by the last reported run.
    pub fn warnings(&self) -> Vec<ReportWarning> {
        self.state.lock().warnings.clone()
    }

    pub fn before_run(&self, descriptor: &ActionDescriptor) -> anyhow::Result<()> {
        let width = self.console.show_header(
            &[
                ("Running: ", MessageKind::Regular),
                (descriptor.name(), MessageKind::TaskName),
            ],
            HEADER_WIDTH,
        )?;
        self.state.lock().msg_len_target = width;
        Ok(())
    }

    pub fn after_run(&self, descriptor: &ActionDescriptor) -> anyhow::Result<()> {
        let console = &self.console;
        let name = descriptor.name();
        // Width of this run's header; a skipped before-run leaves the default.
        let target = std::mem::replace(&mut self.state.lock().msg_len_target, HEADER_WIDTH);
        let status_kind = if descriptor.failed() {
            MessageKind::Error
        } else {
            MessageKind::Regular
        };

        console.show_inline(name, MessageKind::TaskName)?;
        console.show_inline(" status: ", MessageKind::Regular)?;
        console.show(descriptor.status().as_str(), status_kind)?;

        if !descriptor.message().is_empty() {
            console.show(&format!("\n{}", descriptor.message()), status_kind)?;
            if let Some(failure) = descriptor.failure() {
                console.show_header(
                    &[
                        ("Full Traceback (running ", MessageKind::Regular),
                        (name, MessageKind::TaskName),
                        (")", MessageKind::Regular),
                    ],
                    target,
                )?;
                console.show(&failure.trace, MessageKind::Traceback)?;
            }
        }

        let print_result =
            self.print_result && descriptor.result().is_some_and(|result| !result.is_null());
        if print_result || self.json_output.is_some() {
            let artifact = Artifact::of(descriptor);
            if let Some(path) = &self.json_output {
                write_artifact(path, &artifact)?;
                info!("Wrote run result of '{name}' to {}", path.display());
            }
            if print_result {
                console.show("result:", MessageKind::Important)?;
                console.show(&to_indented_json(artifact.result)?, MessageKind::Regular)?;
            }
        }

        let warnings: Vec<ReportWarning> = if descriptor.status() == Status::Pass {
            validate_return(descriptor).into_iter().collect()
        } else {
            Vec::new()
        };
        for warning in &warnings {
            warn!("{warning}");
            console.show(&warning.to_string(), MessageKind::Error)?;
        }
        self.state.lock().warnings = warnings;

        console.show_header(&[], target)?;
        Ok(())
    }
}

/// The persisted run artifact.
#[derive(Debug, Serialize)]
struct Artifact<'a> {
    result: &'a Value,
    message: &'a str,
    status: Status,
}

impl<'a> Artifact<'a> {
    fn of(descriptor: &'a ActionDescriptor) -> Self {
        Self {
            result: descriptor.result().unwrap_or(&Value::Null),
            message: descriptor.message(),
            status: descriptor.status(),
        }
    }
}

fn write_artifact(path: &Path, artifact: &Artifact<'_>) -> Result<(), ReportError> {
    let io_error = |source| ReportError::Io {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(io_error)?;
    }
    let contents = serde_json::to_string(artifact).map_err(|source| ReportError::Unserializable {
        result: artifact.result.to_string(),
        source,
    })?;
    std::fs::write(path, contents).map_err(io_error)?;
    debug!("Artifact written to {}", path.display());
    Ok(())
}

fn to_indented_json(value: &Value) -> Result<String, ReportError> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
    value
        .serialize(&mut serializer)
        .map_err(|source| ReportError::Unserializable {
            result: value.to_string(),
            source,
        })?;
    Ok(String::from_utf8_lossy(&out).into_owned())
}

/// Re-checks the returned value against the declared return type.
///
/// Never changes the status: the run has already settled.
pub fn validate_return(descriptor: &ActionDescriptor) -> Option<ReportWarning> {
    let result = descriptor.result().unwrap_or(&Value::Null);
    let Some(expected) = descriptor.return_type() else {
        return Some(ReportWarning::MissingReturnAnnotation {
            action: descriptor.name().to_string(),
        });
    };
    let detail = expected.check(result).err()?;
    Some(ReportWarning::ReturnTypeMismatch {
        action: descriptor.name().to_string(),
        actual: json_kind(result).to_string(),
        expected: expected.to_string(),
        location: format!("{}, in {}", descriptor.location(), descriptor.name()),
        detail,
    })
}

/// The artifact as a plain value, matching what [`ResultReporter`] writes.
pub fn artifact_value(descriptor: &ActionDescriptor) -> Value {
    let artifact = Artifact::of(descriptor);
    json!({
        "result": artifact.result,
        "message": artifact.message,
        "status": artifact.status,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use schemars::JsonSchema;
    use serde::Deserialize;
    use serde_json::Map;

    use crate::action::{ActionDeclaration, ActionFn, Arguments, ParamDecl};
    use crate::invoker::{invoke, ExecutionContext};
    use crate::types::TypeRef;

    async fn add(args: Arguments) -> anyhow::Result<Value> {
        Ok(json!(args.get::<i64>("a")? + args.get::<i64>("b")?))
    }

    async fn add_as_text(args: Arguments) -> anyhow::Result<Value> {
        Ok(json!((args.get::<i64>("a")? + args.get::<i64>("b")?).to_string()))
    }

    async fn refuses(_args: Arguments) -> anyhow::Result<Value> {
        anyhow::bail!("not today")
    }

    async fn nothing(_args: Arguments) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }

    async fn point(_args: Arguments) -> anyhow::Result<Value> {
        Ok(json!({"x": 1, "y": "two"}))
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct Point {
        x: i64,
        y: i64,
    }

    fn sum_declaration(
        name: &str,
        callable: impl ActionFn + 'static,
        returns: Option<TypeRef>,
    ) -> ActionDeclaration {
        let declaration = ActionDeclaration::new(name, callable)
            .param(ParamDecl::of::<i64>("a"))
            .param(ParamDecl::of::<i64>("b"));
        match returns {
            Some(t) => declaration.returns(t),
            None => declaration,
        }
    }

    fn args(a: i64, b: i64) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("a".to_string(), json!(a));
        map.insert("b".to_string(), json!(b));
        map
    }

    fn args_without_b() -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("a".to_string(), json!(1));
        map
    }

    async fn run_reported(
        reporter: &ResultReporter,
        declaration: ActionDeclaration,
        arguments: Map<String, Value>,
    ) -> ActionDescriptor {
        let hooks = LifecycleHooks::new();
        let _registration = reporter.register(&hooks);
        let mut descriptor = ActionDescriptor::discover(declaration).unwrap();
        let outcome = invoke(&mut descriptor, arguments, &ExecutionContext::new(hooks))
            .await
            .unwrap();
        assert!(outcome.hook_failures.is_empty(), "{:?}", outcome.hook_failures);
        descriptor
    }

    // ── console output ──────────────────────────────

    #[tokio::test]
    async fn test_report_layout_on_pass() {
        let buffer = SharedBuffer::new();
        let reporter = ResultReporter::new(Console::new(buffer.clone(), false)).print_result(true);
        run_reported(&reporter, sum_declaration("add", add, Some(TypeRef::Integer)), args(2, 3)).await;

        let out = buffer.contents();
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[0].contains(" Running: add "));
        assert_eq!(lines[0].chars().count(), 80);
        assert_eq!(lines[1], "add status: PASS");
        assert_eq!(lines[2], "result:");
        assert_eq!(lines[3], "5");
        assert_eq!(lines[4], "=".repeat(80));
        assert!(reporter.warnings().is_empty());
    }

    #[tokio::test]
    async fn test_report_on_failure_shows_trace() {
        let buffer = SharedBuffer::new();
        let reporter = ResultReporter::new(Console::new(buffer.clone(), false));
        let descriptor =
            run_reported(&reporter, ActionDeclaration::new("refuses", refuses), Map::new()).await;

        assert!(descriptor.failed());
        let out = buffer.contents();
        assert!(out.contains("refuses status: FAIL\n\nnot today\n"));
        assert!(out.contains(" Full Traceback (running refuses) "));
        assert!(reporter.warnings().is_empty());
    }

    #[tokio::test]
    async fn test_structured_result_printed_with_four_space_indent() {
        let buffer = SharedBuffer::new();
        let reporter = ResultReporter::new(Console::new(buffer.clone(), false)).print_result(true);
        run_reported(
            &reporter,
            ActionDeclaration::new("point", point),
            Map::new(),
        )
        .await;
        assert!(buffer.contents().contains("{\n    \"x\": 1,\n    \"y\": \"two\"\n}"));
    }

    #[tokio::test]
    async fn test_null_result_is_not_printed() {
        let buffer = SharedBuffer::new();
        let reporter = ResultReporter::new(Console::new(buffer.clone(), false)).print_result(true);
        run_reported(&reporter, ActionDeclaration::new("nothing", nothing), Map::new()).await;

        let out = buffer.contents();
        assert!(out.contains("nothing status: PASS\n"));
        assert!(!out.contains("result:"), "{out}");
    }

    #[tokio::test]
    async fn test_closing_rule_resets_after_binding_failure() {
        let buffer = SharedBuffer::new();
        let reporter = ResultReporter::new(Console::new(buffer.clone(), false));
        // "Running: " plus 91 characters overflows the 80-column header.
        let long_name = "a".repeat(91);
        run_reported(&reporter, ActionDeclaration::new(&long_name, nothing), Map::new()).await;
        let first = buffer.contents();
        assert_eq!(first.lines().last().unwrap(), "=".repeat(108));

        let hooks = LifecycleHooks::new();
        let _registration = reporter.register(&hooks);
        let mut descriptor =
            ActionDescriptor::discover(sum_declaration("add", add, Some(TypeRef::Integer))).unwrap();
        let err = invoke(&mut descriptor, args_without_b(), &ExecutionContext::new(hooks))
            .await
            .unwrap_err();
        assert!(err.hook_failures.is_empty());

        let out = buffer.contents();
        let second = &out[first.len()..];
        assert!(second.starts_with("add status: FAIL\n"), "{second}");
        assert_eq!(second.lines().last().unwrap(), "=".repeat(80));
    }

    // ── artifact ────────────────────────────────────

    #[tokio::test]
    async fn test_artifact_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out").join("result.json");
        let reporter = ResultReporter::new(Console::new(SharedBuffer::new(), false))
            .json_output(Some(path.clone()));
        let descriptor =
            run_reported(&reporter, sum_declaration("add", add, Some(TypeRef::Integer)), args(2, 3)).await;

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, json!({"result": 5, "message": "", "status": "PASS"}));
        assert_eq!(written, artifact_value(&descriptor));
    }

    #[tokio::test]
    async fn test_artifact_written_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("result.json");
        let reporter = ResultReporter::new(Console::new(SharedBuffer::new(), false))
            .json_output(Some(path.clone()));
        run_reported(&reporter, ActionDeclaration::new("refuses", refuses), Map::new()).await;

        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(
            written,
            json!({"result": null, "message": "not today", "status": "FAIL"})
        );
    }

    #[tokio::test]
    async fn test_unwritable_artifact_is_a_hook_failure() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();
        let reporter = ResultReporter::new(Console::new(SharedBuffer::new(), false))
            .json_output(Some(blocker.join("result.json")));

        let hooks = LifecycleHooks::new();
        let _registration = reporter.register(&hooks);
        let mut descriptor =
            ActionDescriptor::discover(sum_declaration("add", add, Some(TypeRef::Integer))).unwrap();
        let outcome = invoke(&mut descriptor, args(1, 1), &ExecutionContext::new(hooks))
            .await
            .unwrap();

        assert_eq!(outcome.status, Status::Pass);
        assert_eq!(outcome.hook_failures.len(), 1);
        assert!(outcome.hook_failures[0].error.contains("unable to write result"));
    }

    // ── return-type validation ──────────────────────

    #[tokio::test]
    async fn test_return_type_mismatch_warns_but_passes() {
        let buffer = SharedBuffer::new();
        let reporter = ResultReporter::new(Console::new(buffer.clone(), false));
        let descriptor = run_reported(
            &reporter,
            sum_declaration("add_as_text", add_as_text, Some(TypeRef::Integer)),
            args(2, 3),
        )
        .await;

        assert_eq!(descriptor.status(), Status::Pass);
        let warnings = reporter.warnings();
        assert_eq!(warnings.len(), 1);
        match &warnings[0] {
            ReportWarning::ReturnTypeMismatch {
                action,
                actual,
                expected,
                ..
            } => {
                assert_eq!(action, "add_as_text");
                assert_eq!(actual, "string");
                assert_eq!(expected, "integer");
            }
            other => panic!("unexpected warning: {other}"),
        }
        assert!(buffer
            .contents()
            .contains("Although the action: 'add_as_text' ran properly"));
    }

    #[tokio::test]
    async fn test_structured_return_is_validated() {
        let reporter = ResultReporter::new(Console::new(SharedBuffer::new(), false));
        run_reported(
            &reporter,
            ActionDeclaration::new("point", point).returns(TypeRef::structured::<Point>()),
            Map::new(),
        )
        .await;

        let warnings = reporter.warnings();
        assert_eq!(warnings.len(), 1);
        match &warnings[0] {
            ReportWarning::ReturnTypeMismatch {
                expected, actual, ..
            } => {
                assert_eq!(expected, "Point");
                assert_eq!(actual, "object");
            }
            other => panic!("unexpected warning: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_return_annotation_is_a_note() {
        let buffer = SharedBuffer::new();
        let reporter = ResultReporter::new(Console::new(buffer.clone(), false));
        let descriptor = run_reported(&reporter, sum_declaration("add", add, None), args(1, 2)).await;

        assert_eq!(descriptor.status(), Status::Pass);
        assert_eq!(
            reporter.warnings(),
            vec![ReportWarning::MissingReturnAnnotation {
                action: "add".to_string()
            }]
        );
        assert!(buffer.contents().contains("Note: Unable to validate return type"));
    }

    #[test]
    fn test_registration_is_scoped() {
        let hooks = LifecycleHooks::new();
        let reporter = ResultReporter::new(Console::new(SharedBuffer::new(), false));
        {
            let _registration = reporter.register(&hooks);
            assert_eq!(hooks.len(crate::hooks::HookPhase::BeforeRun), 1);
            assert_eq!(hooks.len(crate::hooks::HookPhase::AfterRun), 1);
        }
        assert_eq!(hooks.len(crate::hooks::HookPhase::AfterRun), 0);
    }
}
