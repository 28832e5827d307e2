//! The programmatic embedding surface
//!
//! `EvaluatorContext` is the holder an embedder builds up before loading and
//! evaluating a module: security manager, resolvers, loggers, environment
//! variables, external properties, project dependencies, trace mode, module
//! cache directory, HTTP client and the power-assertions flag. None of the
//! concrete collaborators (an HTTP client, a filesystem resolver) live here;
//! this crate only defines the slots they plug into, the same way the
//! teacher's `CompilerConfig` holds `Option<Box<dyn ExternalBuiltin>>` slots
//! without bundling implementations.

use std::collections::HashMap;
use std::sync::Arc;

use pkl_rt::PklError;

use crate::cache::ModuleCache;
use crate::resource::ResourceReader;
use crate::security::{AllowAllSecurityManager, SecurityManager};

/// A logger sink for `trace`/`import`-style evaluator diagnostics distinct
/// from this crate's own `tracing` instrumentation — an embedder typically
/// bridges this to its own logging setup.
pub trait EvaluatorLogger: Send + Sync {
    fn trace(&self, message: &str);
    fn warn(&self, message: &str);
}

/// A logger that forwards to `tracing`, the default when an embedder
/// doesn't install its own.
pub struct TracingLogger;

impl EvaluatorLogger for TracingLogger {
    fn trace(&self, message: &str) {
        tracing::trace!(target: "pkl::eval", "{message}");
    }
    fn warn(&self, message: &str) {
        tracing::warn!(target: "pkl::eval", "{message}");
    }
}

/// A single declared project dependency (name + resolved package URI), as
/// read from a `PklProject` file by an external collaborator.
#[derive(Debug, Clone)]
pub struct ProjectDependency {
    pub name: String,
    pub package_uri: String,
}

/// Builder for an evaluator's ambient configuration, validated once at
/// `build()` rather than checked piecemeal on every setter.
pub struct EvaluatorContextBuilder {
    security_manager: Option<Arc<dyn SecurityManager>>,
    resource_readers: Vec<Arc<dyn ResourceReader>>,
    logger: Option<Arc<dyn EvaluatorLogger>>,
    env_vars: HashMap<String, String>,
    external_properties: HashMap<String, String>,
    project_dependencies: Vec<ProjectDependency>,
    trace_mode: bool,
    module_cache_dir: Option<String>,
    http_client_configured: bool,
    allow_power_assertions: bool,
}

impl Default for EvaluatorContextBuilder {
    fn default() -> Self {
        EvaluatorContextBuilder {
            security_manager: None,
            resource_readers: Vec::new(),
            logger: None,
            env_vars: HashMap::new(),
            external_properties: HashMap::new(),
            project_dependencies: Vec::new(),
            trace_mode: false,
            module_cache_dir: None,
            http_client_configured: false,
            allow_power_assertions: true,
        }
    }
}

impl EvaluatorContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_security_manager(mut self, security_manager: Arc<dyn SecurityManager>) -> Self {
        self.security_manager = Some(security_manager);
        self
    }

    pub fn with_resource_reader(mut self, reader: Arc<dyn ResourceReader>) -> Self {
        self.resource_readers.push(reader);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn EvaluatorLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn with_env_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.insert(name.into(), value.into());
        self
    }

    pub fn with_external_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.external_properties.insert(name.into(), value.into());
        self
    }

    pub fn with_project_dependency(mut self, dependency: ProjectDependency) -> Self {
        self.project_dependencies.push(dependency);
        self
    }

    pub fn with_trace_mode(mut self, enabled: bool) -> Self {
        self.trace_mode = enabled;
        self
    }

    pub fn with_module_cache_dir(mut self, dir: impl Into<String>) -> Self {
        self.module_cache_dir = Some(dir.into());
        self
    }

    /// Records that an HTTP-capable resource reader has been wired in; the
    /// client itself is just another [`ResourceReader`] registered via
    /// [`with_resource_reader`](Self::with_resource_reader).
    pub fn with_http_client(mut self) -> Self {
        self.http_client_configured = true;
        self
    }

    pub fn with_power_assertions(mut self, allowed: bool) -> Self {
        self.allow_power_assertions = allowed;
        self
    }

    /// Validates the accumulated configuration and produces an immutable
    /// [`EvaluatorContext`]. A context with project dependencies but no
    /// module cache directory is rejected: dependency resolution needs
    /// somewhere to materialize resolved packages.
    pub fn build(self) -> Result<EvaluatorContext, PklError> {
        if !self.project_dependencies.is_empty() && self.module_cache_dir.is_none() {
            return Err(PklError::eval(
                "project dependencies were declared but no module cache directory was configured",
            ));
        }
        let security_manager = self.security_manager.unwrap_or_else(|| Arc::new(AllowAllSecurityManager));
        let logger = self.logger.unwrap_or_else(|| Arc::new(TracingLogger));
        Ok(EvaluatorContext {
            security_manager,
            resources: crate::resource::ResourceMediator::new(self.resource_readers),
            cache: ModuleCache::new(),
            logger,
            env_vars: self.env_vars,
            external_properties: self.external_properties,
            project_dependencies: self.project_dependencies,
            trace_mode: self.trace_mode,
            module_cache_dir: self.module_cache_dir,
            allow_power_assertions: self.allow_power_assertions,
        })
    }
}

/// Everything an evaluation needs beyond the parsed AST: the collaborators
/// and settings installed through [`EvaluatorContextBuilder`] before a
/// module is loaded and evaluated.
pub struct EvaluatorContext {
    pub security_manager: Arc<dyn SecurityManager>,
    pub resources: crate::resource::ResourceMediator,
    pub cache: ModuleCache,
    pub logger: Arc<dyn EvaluatorLogger>,
    pub env_vars: HashMap<String, String>,
    pub external_properties: HashMap<String, String>,
    pub project_dependencies: Vec<ProjectDependency>,
    pub trace_mode: bool,
    pub module_cache_dir: Option<String>,
    pub allow_power_assertions: bool,
}

impl EvaluatorContext {
    pub fn builder() -> EvaluatorContextBuilder {
        EvaluatorContextBuilder::new()
    }

    pub fn env_var(&self, name: &str) -> Option<&str> {
        self.env_vars.get(name).map(String::as_str)
    }

    pub fn external_property(&self, name: &str) -> Option<&str> {
        self.external_properties.get(name).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_build_uses_allow_all_security_and_no_cache_dir() {
        let ctx = EvaluatorContext::builder().build().unwrap();
        assert!(ctx.module_cache_dir.is_none());
        assert!(ctx.allow_power_assertions);
    }

    #[test]
    fn project_dependency_without_cache_dir_is_rejected() {
        let result = EvaluatorContext::builder()
            .with_project_dependency(ProjectDependency {
                name: "widgets".to_string(),
                package_uri: "package://example.com/widgets@1.0.0".to_string(),
            })
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn project_dependency_with_cache_dir_builds() {
        let ctx = EvaluatorContext::builder()
            .with_module_cache_dir("/tmp/pkl-cache")
            .with_project_dependency(ProjectDependency {
                name: "widgets".to_string(),
                package_uri: "package://example.com/widgets@1.0.0".to_string(),
            })
            .with_env_var("HOME", "/home/pkl")
            .build()
            .unwrap();
        assert_eq!(ctx.env_var("HOME"), Some("/home/pkl"));
        assert_eq!(ctx.project_dependencies.len(), 1);
    }
}
