//! ExecutionService: the single coordinator between callers and the
//! extractor, compiler and sandbox crates.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::Span;
use uuid::Uuid;

use fraglink_check::derive_dependency_edges;
use fraglink_codegen::compiler::compile;
use fraglink_codegen::{CompileOptions, CompiledUnit};
use fraglink_core::{CompileRequest, FragmentGraph};
use fraglink_sandbox::{ExecutionOutcome, ExecutionResult, ModuleRegistry, SandboxExecutor};

use crate::config::ServiceConfig;
use crate::error::ServiceError;
use crate::schema::ExecutionResponse;

/// Compiles fragment graphs and runs them in bounded sandboxes.
///
/// Holds no per-request state: every call builds its own graph, unit and
/// isolate, so one service can be shared across tasks. The semaphore caps
/// how many isolates exist at once, which bounds worst-case memory at
/// `max_concurrent * memory_limit`.
#[derive(Debug, Clone)]
pub struct ExecutionService {
    config: ServiceConfig,
    executor: SandboxExecutor,
    permits: Arc<Semaphore>,
}

impl ExecutionService {
    /// Creates a service, loading extra modules from `config.module_dir`.
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        let modules = config.module_registry()?;
        Ok(Self::with_modules(config, modules))
    }

    /// Creates a service from `FRAGLINK_*` environment variables.
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::new(ServiceConfig::from_env()?)
    }

    /// Creates a service with an explicit module allowlist.
    pub fn with_modules(config: ServiceConfig, modules: ModuleRegistry) -> Self {
        let executor = SandboxExecutor::with_modules(config.limits.clone(), modules);
        let permits = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
        ExecutionService {
            config,
            executor,
            permits,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn executor(&self) -> &SandboxExecutor {
        &self.executor
    }

    /// Compile options derived from the configuration.
    pub fn compile_options(&self) -> CompileOptions {
        CompileOptions {
            hoist_mode: self.config.hoist_mode,
            ..CompileOptions::default()
        }
    }

    // -----------------------------------------------------------------------
    // Validation and compilation
    // -----------------------------------------------------------------------

    /// Validates a request and builds its graph.
    ///
    /// When the request has no explicit edges they are derived from each
    /// fragment's imports.
    pub fn prepare(&self, request: &CompileRequest) -> Result<FragmentGraph, ServiceError> {
        if request.fragments.is_empty() {
            return Err(ServiceError::EmptyGraph);
        }

        let edges = match &request.edges {
            Some(edges) => edges.clone(),
            None => derive_dependency_edges(&request.fragments),
        };
        let graph = FragmentGraph::from_parts(request.fragments.iter().cloned(), edges)?;

        if !graph.contains(request.entry_id.as_str()) {
            return Err(ServiceError::EntryNotFound(request.entry_id.to_string()));
        }
        Ok(graph)
    }

    /// Validates and compiles a request with the configured options.
    pub fn compile(&self, request: &CompileRequest) -> Result<CompiledUnit, ServiceError> {
        self.compile_with(request, &self.compile_options())
    }

    /// Validates and compiles a request with explicit options.
    pub fn compile_with(
        &self,
        request: &CompileRequest,
        options: &CompileOptions,
    ) -> Result<CompiledUnit, ServiceError> {
        let graph = self.prepare(request)?;
        let unit = compile(&graph, request.entry_id.as_str(), options);
        for diagnostic in &unit.diagnostics {
            tracing::warn!(%diagnostic, "compile diagnostic");
        }
        Ok(unit)
    }

    // -----------------------------------------------------------------------
    // Execution
    // -----------------------------------------------------------------------

    /// Compiles and runs a request with the configured options.
    pub async fn execute(&self, request: CompileRequest) -> Result<ExecutionResponse, ServiceError> {
        let options = self.compile_options();
        self.execute_with(request, options).await
    }

    /// Compiles and runs a request with explicit compile options.
    ///
    /// Fails only when the request is rejected before compilation; anything
    /// that goes wrong afterwards is a failed result.
    pub async fn execute_with(
        &self,
        request: CompileRequest,
        options: CompileOptions,
    ) -> Result<ExecutionResponse, ServiceError> {
        let started = Instant::now();
        let execution_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "execute",
            %execution_id,
            entry = %request.entry_id,
            fragments = request.fragments.len(),
        );

        let unit = span.in_scope(|| self.compile_with(&request, &options))?;
        tracing::debug!(
            parent: &span,
            digest = %unit.digest,
            order = ?unit.order,
            "compiled unit"
        );

        let (outcome, result) = self.run_unit(unit.source, span.clone()).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        tracing::info!(
            parent: &span,
            success = result.success,
            status = outcome.error_code().unwrap_or("OK"),
            elapsed_ms,
            "execution finished"
        );

        Ok(ExecutionResponse {
            execution_id,
            result,
            outcome,
            diagnostics: unit.diagnostics,
            digest: unit.digest,
            elapsed_ms,
        })
    }

    /// Compiles and runs a request, returning only the caller-facing result.
    pub async fn execute_result(
        &self,
        request: CompileRequest,
    ) -> Result<ExecutionResult, ServiceError> {
        Ok(self.execute(request).await?.result)
    }

    /// Runs a compiled unit on a blocking thread once a permit is free.
    async fn run_unit(&self, source: String, span: Span) -> (ExecutionOutcome, ExecutionResult) {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => return internal_failure(format!("execution queue closed: {e}")),
        };

        let executor = self.executor.clone();
        let joined =
            tokio::task::spawn_blocking(move || span.in_scope(|| executor.execute(&source))).await;

        match joined {
            Ok(report) => (report.outcome.clone(), ExecutionResult::from(report)),
            Err(e) => {
                tracing::warn!(error = %e, "execution task failed");
                internal_failure(format!("execution task failed: {e}"))
            }
        }
    }
}

fn internal_failure(message: String) -> (ExecutionOutcome, ExecutionResult) {
    let error = format!("InternalError: {message}");
    (
        ExecutionOutcome::Internal {
            error: error.clone(),
        },
        ExecutionResult::failure(error),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use fraglink_core::{DependencyEdge, Fragment};

    fn service() -> ExecutionService {
        ExecutionService::with_modules(ServiceConfig::default(), ModuleRegistry::with_builtins())
    }

    #[test]
    fn empty_requests_are_rejected() {
        let request = CompileRequest::new(Vec::new(), Vec::new(), "a");
        assert!(matches!(service().prepare(&request), Err(ServiceError::EmptyGraph)));
    }

    #[test]
    fn unknown_entry_is_rejected() {
        let request = CompileRequest::new(vec![Fragment::new("a", "1;")], Vec::new(), "b");
        let err = service().prepare(&request).unwrap_err();
        assert!(matches!(err, ServiceError::EntryNotFound(ref id) if id == "b"));
    }

    #[test]
    fn duplicate_fragments_are_rejected() {
        let request = CompileRequest::new(
            vec![Fragment::new("a", "1;"), Fragment::new("a", "2;")],
            Vec::new(),
            "a",
        );
        let err = service().prepare(&request).unwrap_err();
        assert_eq!(err.code(), "BAD_REQUEST");
    }

    #[test]
    fn edges_are_derived_when_absent() {
        let request = CompileRequest::from_imports(
            vec![
                Fragment::new("main", "import { f } from './lib.js';\nf();"),
                Fragment::new("lib", "export function f() {}").with_file_name("lib.js"),
            ],
            "main",
        );
        let graph = service().prepare(&request).unwrap();
        let deps: Vec<&str> = graph.dependencies("main").iter().map(|d| d.as_str()).collect();
        assert_eq!(deps, vec!["lib"]);
    }

    #[test]
    fn explicit_edges_win_over_imports() {
        let request = CompileRequest::new(
            vec![
                Fragment::new("main", "import { f } from './lib.js';"),
                Fragment::new("lib", "export function f() {}").with_file_name("lib.js"),
            ],
            vec![DependencyEdge::new("lib", "main")],
            "main",
        );
        let graph = service().prepare(&request).unwrap();
        assert!(graph.dependencies("main").is_empty());
        assert_eq!(graph.dependencies("lib").len(), 1);
    }

    #[test]
    fn compile_uses_configured_hoist_mode() {
        let config = ServiceConfig {
            hoist_mode: fraglink_codegen::HoistMode::Global,
            ..ServiceConfig::default()
        };
        let service = ExecutionService::with_modules(config, ModuleRegistry::with_builtins());
        let request = CompileRequest::new(
            vec![Fragment::new("a", "function f() {}").with_exports(["f"])],
            Vec::new(),
            "a",
        );
        let unit = service.compile(&request).unwrap();
        assert!(unit.source.contains("__fl_export_global(__fl_module.exports, \"f\""));
    }
}
