//! Module handlers and their registry.
//!
//! A handler binds a module type to the tool that executes it. Handlers
//! receive a fully-merged [`HandlerPayload`] and expose one async method
//! per action; an action a handler does not implement is a fatal
//! configuration error, never a silent no-op. Every tool invocation runs
//! with an explicit working directory and an explicit environment map.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::context::Action;
use crate::error::{ModuleError, Result, RunwayError};

use super::type_resolver::ModuleType;

/// The merged inputs a handler is constructed with.
#[derive(Debug, Clone)]
pub struct HandlerPayload {
    /// Module name, used in logs and errors.
    pub name: String,
    /// Directory the tool runs in.
    pub module_root: PathBuf,
    /// Current deploy-environment name.
    pub environment: String,
    /// Current AWS region.
    pub region: String,
    /// Full environment map for the tool subprocess.
    pub env_vars: HashMap<String, String>,
    /// Merged handler options (module wins over deployment defaults).
    pub options: serde_json::Map<String, Value>,
    /// Merged parameters (module wins over deployment defaults).
    pub parameters: serde_json::Map<String, Value>,
    /// Gate outcome: `Some(true)` explicitly enabled, `None` deferred.
    pub explicitly_enabled: Option<bool>,
}

impl HandlerPayload {
    /// Returns a string option by key.
    fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    /// Returns a required string option.
    fn require_option(&self, key: &str) -> Result<&str> {
        self.option_str(key).ok_or_else(|| {
            ModuleError::MissingOption {
                module: self.name.clone(),
                option: key.to_string(),
            }
            .into()
        })
    }
}

/// A module handler: one async method per supported action.
#[async_trait]
pub trait ModuleHandler: Send + Sync {
    /// The handler's type name, used in diagnostics.
    fn type_name(&self) -> &'static str;

    /// Creates or updates the module's infrastructure.
    async fn deploy(&self) -> Result<()> {
        Err(self.unsupported(Action::Deploy))
    }

    /// Tears the module's infrastructure down.
    async fn destroy(&self) -> Result<()> {
        Err(self.unsupported(Action::Destroy))
    }

    /// Shows what a deploy would change.
    async fn plan(&self) -> Result<()> {
        Err(self.unsupported(Action::Plan))
    }

    /// Runs per-tool initialization.
    async fn init(&self) -> Result<()> {
        Err(self.unsupported(Action::Init))
    }

    /// Dispatches to the method named by the action.
    async fn run(&self, action: Action) -> Result<()> {
        match action {
            Action::Deploy => self.deploy().await,
            Action::Destroy => self.destroy().await,
            Action::Plan => self.plan().await,
            Action::Init => self.init().await,
        }
    }

    /// Builds the error for an action this handler does not implement.
    fn unsupported(&self, action: Action) -> RunwayError {
        ModuleError::UnsupportedAction {
            handler: self.type_name().to_string(),
            action: action.name().to_string(),
        }
        .into()
    }
}

/// Constructor for a handler of one module type.
type HandlerFactory = fn(HandlerPayload) -> Box<dyn ModuleHandler>;

/// Registry of handler factories keyed by module type.
pub struct HandlerRegistry {
    factories: HashMap<ModuleType, HandlerFactory>,
}

impl HandlerRegistry {
    /// Constructs the handler for a module type.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the type has no registered factory.
    pub fn build(
        &self,
        module_type: ModuleType,
        payload: HandlerPayload,
    ) -> Result<Box<dyn ModuleHandler>> {
        let factory = self.factories.get(&module_type).ok_or_else(|| {
            RunwayError::internal(format!("no handler registered for type '{module_type}'"))
        })?;
        Ok(factory(payload))
    }
}

impl Default for HandlerRegistry {
    /// Creates a registry with every built-in handler registered.
    fn default() -> Self {
        let mut factories: HashMap<ModuleType, HandlerFactory> = HashMap::new();
        for module_type in ModuleType::ALL {
            let factory: HandlerFactory = match module_type {
                ModuleType::Terraform => |p| Box::new(TerraformHandler { payload: p }),
                ModuleType::CloudFormation => |p| Box::new(CloudFormationHandler { payload: p }),
                ModuleType::Serverless => |p| Box::new(ServerlessHandler { payload: p }),
                ModuleType::Cdk => |p| Box::new(CdkHandler { payload: p }),
                ModuleType::Kubernetes => |p| Box::new(KubernetesHandler { payload: p }),
                ModuleType::Sam => |p| Box::new(SamHandler { payload: p }),
                ModuleType::StaticSite => |p| Box::new(StaticSiteHandler { payload: p }),
            };
            factories.insert(module_type, factory);
        }
        Self { factories }
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<&str> = self.factories.keys().map(|t| t.name()).collect();
        types.sort_unstable();
        f.debug_struct("HandlerRegistry").field("types", &types).finish()
    }
}

/// Runs a tool subprocess in the module root with the payload's
/// environment map.
async fn run_tool(payload: &HandlerPayload, program: &str, args: &[String]) -> Result<()> {
    info!("[{}] Running: {program} {}", payload.name, args.join(" "));

    let status = tokio::process::Command::new(program)
        .args(args)
        .current_dir(&payload.module_root)
        .env_clear()
        .envs(&payload.env_vars)
        .status()
        .await
        .map_err(|e| ModuleError::SpawnFailed {
            program: program.to_string(),
            module: payload.name.clone(),
            message: e.to_string(),
        })?;

    if !status.success() {
        return Err(ModuleError::ToolFailed {
            program: program.to_string(),
            module: payload.name.clone(),
            code: status.code().unwrap_or(-1),
        }
        .into());
    }
    Ok(())
}

/// Renders a parameters map as `key=value` CLI arguments.
fn parameter_overrides(parameters: &serde_json::Map<String, Value>) -> Vec<String> {
    parameters
        .iter()
        .map(|(key, value)| {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            format!("{key}={rendered}")
        })
        .collect()
}

/// Converts a `&str` argument list into owned strings.
fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(ToString::to_string).collect()
}

/// Runs Terraform root modules.
struct TerraformHandler {
    payload: HandlerPayload,
}

#[async_trait]
impl ModuleHandler for TerraformHandler {
    fn type_name(&self) -> &'static str {
        "terraform"
    }

    async fn init(&self) -> Result<()> {
        run_tool(&self.payload, "terraform", &args(&["init", "-input=false"])).await
    }

    async fn plan(&self) -> Result<()> {
        run_tool(&self.payload, "terraform", &args(&["plan", "-input=false"])).await
    }

    async fn deploy(&self) -> Result<()> {
        run_tool(
            &self.payload,
            "terraform",
            &args(&["apply", "-input=false", "-auto-approve"]),
        )
        .await
    }

    async fn destroy(&self) -> Result<()> {
        run_tool(
            &self.payload,
            "terraform",
            &args(&["destroy", "-input=false", "-auto-approve"]),
        )
        .await
    }
}

/// Deploys CloudFormation stacks through the AWS CLI.
struct CloudFormationHandler {
    payload: HandlerPayload,
}

impl CloudFormationHandler {
    /// Stack name: explicit option or `<module>-<environment>`.
    fn stack_name(&self) -> String {
        self.payload.option_str("stack_name").map_or_else(
            || format!("{}-{}", self.payload.name, self.payload.environment),
            ToString::to_string,
        )
    }

    /// Builds the `deploy` invocation, optionally as a change-set preview.
    fn deploy_args(&self, execute: bool) -> Result<Vec<String>> {
        let template = self.payload.require_option("template")?;
        let mut cli_args = args(&[
            "cloudformation",
            "deploy",
            "--template-file",
            template,
            "--stack-name",
        ]);
        cli_args.push(self.stack_name());
        if !execute {
            cli_args.push(String::from("--no-execute-changeset"));
        }
        if !self.payload.parameters.is_empty() {
            cli_args.push(String::from("--parameter-overrides"));
            cli_args.extend(parameter_overrides(&self.payload.parameters));
        }
        Ok(cli_args)
    }
}

#[async_trait]
impl ModuleHandler for CloudFormationHandler {
    fn type_name(&self) -> &'static str {
        "cloudformation"
    }

    async fn plan(&self) -> Result<()> {
        let cli_args = self.deploy_args(false)?;
        run_tool(&self.payload, "aws", &cli_args).await
    }

    async fn deploy(&self) -> Result<()> {
        let cli_args = self.deploy_args(true)?;
        run_tool(&self.payload, "aws", &cli_args).await
    }

    async fn destroy(&self) -> Result<()> {
        let mut cli_args = args(&["cloudformation", "delete-stack", "--stack-name"]);
        cli_args.push(self.stack_name());
        run_tool(&self.payload, "aws", &cli_args).await
    }
}

/// Runs Serverless Framework services through npx.
struct ServerlessHandler {
    payload: HandlerPayload,
}

impl ServerlessHandler {
    /// Common stage/region arguments.
    fn stage_args(&self) -> Vec<String> {
        let mut cli_args = vec![
            String::from("--stage"),
            self.payload.environment.clone(),
        ];
        if !self.payload.region.is_empty() {
            cli_args.push(String::from("--region"));
            cli_args.push(self.payload.region.clone());
        }
        cli_args
    }
}

#[async_trait]
impl ModuleHandler for ServerlessHandler {
    fn type_name(&self) -> &'static str {
        "serverless"
    }

    async fn deploy(&self) -> Result<()> {
        let mut cli_args = args(&["serverless", "deploy"]);
        cli_args.extend(self.stage_args());
        run_tool(&self.payload, "npx", &cli_args).await
    }

    async fn destroy(&self) -> Result<()> {
        let mut cli_args = args(&["serverless", "remove"]);
        cli_args.extend(self.stage_args());
        run_tool(&self.payload, "npx", &cli_args).await
    }
}

/// Runs AWS CDK applications through npx.
struct CdkHandler {
    payload: HandlerPayload,
}

#[async_trait]
impl ModuleHandler for CdkHandler {
    fn type_name(&self) -> &'static str {
        "cdk"
    }

    async fn init(&self) -> Result<()> {
        run_tool(&self.payload, "npx", &args(&["cdk", "bootstrap"])).await
    }

    async fn plan(&self) -> Result<()> {
        run_tool(&self.payload, "npx", &args(&["cdk", "diff"])).await
    }

    async fn deploy(&self) -> Result<()> {
        run_tool(
            &self.payload,
            "npx",
            &args(&["cdk", "deploy", "--require-approval", "never"]),
        )
        .await
    }

    async fn destroy(&self) -> Result<()> {
        run_tool(&self.payload, "npx", &args(&["cdk", "destroy", "--force"])).await
    }
}

/// Applies kustomize overlays with kubectl.
struct KubernetesHandler {
    payload: HandlerPayload,
}

impl KubernetesHandler {
    /// The overlay for the current environment, falling back to the module
    /// root when no per-environment overlay exists.
    fn overlay_path(&self) -> String {
        let overlay = self
            .payload
            .module_root
            .join("overlays")
            .join(&self.payload.environment);
        if overlay.is_dir() {
            overlay.to_string_lossy().to_string()
        } else {
            self.payload.module_root.to_string_lossy().to_string()
        }
    }
}

#[async_trait]
impl ModuleHandler for KubernetesHandler {
    fn type_name(&self) -> &'static str {
        "kubernetes"
    }

    async fn plan(&self) -> Result<()> {
        let overlay = self.overlay_path();
        run_tool(&self.payload, "kubectl", &args(&["diff", "-k", &overlay])).await
    }

    async fn deploy(&self) -> Result<()> {
        let overlay = self.overlay_path();
        run_tool(&self.payload, "kubectl", &args(&["apply", "-k", &overlay])).await
    }

    async fn destroy(&self) -> Result<()> {
        let overlay = self.overlay_path();
        run_tool(
            &self.payload,
            "kubectl",
            &args(&["delete", "-k", &overlay, "--ignore-not-found"]),
        )
        .await
    }
}

/// Runs AWS SAM applications.
struct SamHandler {
    payload: HandlerPayload,
}

#[async_trait]
impl ModuleHandler for SamHandler {
    fn type_name(&self) -> &'static str {
        "sam"
    }

    async fn init(&self) -> Result<()> {
        run_tool(&self.payload, "sam", &args(&["build"])).await
    }

    async fn deploy(&self) -> Result<()> {
        run_tool(
            &self.payload,
            "sam",
            &args(&["deploy", "--no-confirm-changeset", "--no-fail-on-empty-changeset"]),
        )
        .await
    }

    async fn destroy(&self) -> Result<()> {
        run_tool(&self.payload, "sam", &args(&["delete", "--no-prompts"])).await
    }
}

/// Syncs a static site build directory to an S3 bucket.
struct StaticSiteHandler {
    payload: HandlerPayload,
}

impl StaticSiteHandler {
    /// Target bucket URI from the required `bucket` option.
    fn bucket_uri(&self) -> Result<String> {
        let bucket = self.payload.require_option("bucket")?;
        Ok(format!("s3://{}", bucket.trim_start_matches("s3://")))
    }

    /// Source directory: the `build_dir` option or the module root.
    fn source_dir(&self) -> String {
        self.payload
            .option_str("build_dir")
            .map_or_else(|| String::from("."), ToString::to_string)
    }
}

#[async_trait]
impl ModuleHandler for StaticSiteHandler {
    fn type_name(&self) -> &'static str {
        "static"
    }

    async fn plan(&self) -> Result<()> {
        let bucket = self.bucket_uri()?;
        let source = self.source_dir();
        run_tool(
            &self.payload,
            "aws",
            &args(&["s3", "sync", &source, &bucket, "--delete", "--dryrun"]),
        )
        .await
    }

    async fn deploy(&self) -> Result<()> {
        let bucket = self.bucket_uri()?;
        let source = self.source_dir();
        run_tool(
            &self.payload,
            "aws",
            &args(&["s3", "sync", &source, &bucket, "--delete"]),
        )
        .await
    }

    async fn destroy(&self) -> Result<()> {
        let bucket = self.bucket_uri()?;
        run_tool(&self.payload, "aws", &args(&["s3", "rm", &bucket, "--recursive"])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(options: serde_json::Map<String, Value>) -> HandlerPayload {
        HandlerPayload {
            name: String::from("site"),
            module_root: PathBuf::from("/work/site.web"),
            environment: String::from("dev"),
            region: String::from("us-east-1"),
            env_vars: HashMap::new(),
            options,
            parameters: serde_json::Map::new(),
            explicitly_enabled: Some(true),
        }
    }

    #[tokio::test]
    async fn test_unsupported_action_is_config_error() {
        let registry = HandlerRegistry::default();
        let handler = registry
            .build(ModuleType::Serverless, payload(serde_json::Map::new()))
            .unwrap();

        let err = handler.run(Action::Plan).await.unwrap_err();
        assert!(matches!(
            err,
            RunwayError::Module(ModuleError::UnsupportedAction { .. })
        ));
        assert!(err.to_string().contains("plan"));
    }

    #[tokio::test]
    async fn test_missing_required_option_named_in_error() {
        let registry = HandlerRegistry::default();
        let handler = registry
            .build(ModuleType::StaticSite, payload(serde_json::Map::new()))
            .unwrap();

        let err = handler.deploy().await.unwrap_err();
        assert!(matches!(
            err,
            RunwayError::Module(ModuleError::MissingOption { .. })
        ));
        assert!(err.to_string().contains("bucket"));
    }

    #[test]
    fn test_every_type_has_a_factory() {
        let registry = HandlerRegistry::default();
        for module_type in ModuleType::ALL {
            assert!(registry
                .build(module_type, payload(serde_json::Map::new()))
                .is_ok());
        }
    }

    #[test]
    fn test_parameter_overrides_rendering() {
        let mut parameters = serde_json::Map::new();
        parameters.insert(String::from("Stage"), json!("dev"));
        parameters.insert(String::from("Count"), json!(2));

        let rendered = parameter_overrides(&parameters);
        assert!(rendered.contains(&String::from("Stage=dev")));
        assert!(rendered.contains(&String::from("Count=2")));
    }

    #[test]
    fn test_static_site_bucket_uri_normalized() {
        let mut options = serde_json::Map::new();
        options.insert(String::from("bucket"), json!("s3://my-site"));
        let handler = StaticSiteHandler {
            payload: payload(options),
        };
        assert_eq!(handler.bucket_uri().unwrap(), "s3://my-site");
    }
}
