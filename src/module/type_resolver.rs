//! Module type resolution.
//!
//! Determines which handler governs a module directory, by precedence:
//! explicit `type` key, directory-name suffix, then filesystem
//! autodetection over tool marker files. Autodetection only reads the
//! filesystem. No match is a fatal error.

use std::path::Path;

use tracing::{debug, info};

use crate::error::{ConfigError, ModuleError, Result};

/// The supported module handler types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleType {
    /// Terraform root module.
    Terraform,
    /// CloudFormation stack templates.
    CloudFormation,
    /// Serverless Framework service.
    Serverless,
    /// AWS CDK application.
    Cdk,
    /// Kubernetes kustomize overlays.
    Kubernetes,
    /// AWS SAM application.
    Sam,
    /// Static site synced to S3.
    StaticSite,
}

impl ModuleType {
    /// Every supported type, used to populate the handler registry.
    pub const ALL: [Self; 7] = [
        Self::Terraform,
        Self::CloudFormation,
        Self::Serverless,
        Self::Cdk,
        Self::Kubernetes,
        Self::Sam,
        Self::StaticSite,
    ];

    /// Returns the display name of the type.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Terraform => "terraform",
            Self::CloudFormation => "cloudformation",
            Self::Serverless => "serverless",
            Self::Cdk => "cdk",
            Self::Kubernetes => "kubernetes",
            Self::Sam => "sam",
            Self::StaticSite => "static",
        }
    }

    /// Maps an explicit `type` key to a module type.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "terraform" | "tf" => Some(Self::Terraform),
            "cloudformation" | "cfn" => Some(Self::CloudFormation),
            "serverless" | "sls" => Some(Self::Serverless),
            "cdk" => Some(Self::Cdk),
            "kubernetes" | "k8s" => Some(Self::Kubernetes),
            "sam" => Some(Self::Sam),
            "static" | "web" => Some(Self::StaticSite),
            _ => None,
        }
    }

    /// Maps a directory-name suffix (e.g. `app.tf`, `app.cfn`) to a type.
    fn from_suffix(directory_name: &str) -> Option<Self> {
        let (_, suffix) = directory_name.rsplit_once('.')?;
        match suffix {
            "tf" => Some(Self::Terraform),
            "cfn" => Some(Self::CloudFormation),
            "sls" => Some(Self::Serverless),
            "cdk" => Some(Self::Cdk),
            "k8s" => Some(Self::Kubernetes),
            "sam" => Some(Self::Sam),
            "web" => Some(Self::StaticSite),
            _ => None,
        }
    }
}

impl std::fmt::Display for ModuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolves the module type of a directory.
///
/// # Errors
///
/// Returns an error for an unknown explicit key or when no detection step
/// matches.
pub fn resolve(path: &Path, explicit: Option<&str>, module_name: &str) -> Result<ModuleType> {
    if let Some(key) = explicit {
        let module_type = ModuleType::from_key(key).ok_or_else(|| ConfigError::UnknownModuleType {
            type_name: key.to_string(),
            module: module_name.to_string(),
        })?;
        debug!("Module type from explicit key '{key}': {module_type}");
        return Ok(module_type);
    }

    if let Some(module_type) = path
        .file_name()
        .and_then(|name| name.to_str())
        .and_then(ModuleType::from_suffix)
    {
        debug!("Module type from path suffix: {module_type}");
        return Ok(module_type);
    }

    if let Some(module_type) = autodetect(path) {
        info!("Autodetected module type for '{module_name}': {module_type}");
        return Ok(module_type);
    }

    Err(ModuleError::TypeUndetermined {
        path: path.to_path_buf(),
    }
    .into())
}

/// Inspects marker files to determine the module type.
fn autodetect(path: &Path) -> Option<ModuleType> {
    let has_package_json = path.join("package.json").is_file();

    let serverless_markers = ["serverless.yml", "serverless.js", "serverless.ts"];
    if has_package_json && serverless_markers.iter().any(|m| path.join(m).is_file()) {
        debug!("Found serverless marker files");
        return Some(ModuleType::Serverless);
    }

    if has_file_with_extension(path, "tf") {
        debug!("Found *.tf files");
        return Some(ModuleType::Terraform);
    }

    if has_package_json && path.join("cdk.json").is_file() {
        debug!("Found cdk.json and package.json");
        return Some(ModuleType::Cdk);
    }

    let overlays = path.join("overlays");
    if overlays.is_dir() && contains_kustomization(&overlays) {
        debug!("Found kustomization under overlays/");
        return Some(ModuleType::Kubernetes);
    }

    if ["env", "yaml", "yml"]
        .iter()
        .any(|ext| has_file_with_extension(path, ext))
    {
        debug!("Falling back to cloudformation from config-like files");
        return Some(ModuleType::CloudFormation);
    }

    None
}

/// Returns true when the directory directly contains a file with the
/// given extension.
fn has_file_with_extension(path: &Path, extension: &str) -> bool {
    let Ok(entries) = std::fs::read_dir(path) else {
        return false;
    };
    entries.flatten().any(|entry| {
        let entry_path = entry.path();
        entry_path.is_file()
            && entry_path
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
    })
}

/// Returns true when a `kustomization.yaml` exists anywhere under `path`.
fn contains_kustomization(path: &Path) -> bool {
    let Ok(entries) = std::fs::read_dir(path) else {
        return false;
    };
    for entry in entries.flatten() {
        let entry_path = entry.path();
        if entry_path.is_dir() {
            if contains_kustomization(&entry_path) {
                return true;
            }
        } else if entry_path
            .file_name()
            .is_some_and(|name| name == "kustomization.yaml" || name == "kustomization.yml")
        {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_explicit_key_wins_over_markers() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.tf"), "").unwrap();

        let module_type = resolve(dir.path(), Some("cfn"), "app").unwrap();
        assert_eq!(module_type, ModuleType::CloudFormation);
    }

    #[test]
    fn test_unknown_explicit_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve(dir.path(), Some("pulumi"), "app").unwrap_err();
        assert!(err.to_string().contains("pulumi"));
    }

    #[test]
    fn test_suffix_detection() {
        let dir = tempfile::tempdir().unwrap();
        let suffixed = dir.path().join("sampleapp.cfn");
        fs::create_dir(&suffixed).unwrap();

        let module_type = resolve(&suffixed, None, "app").unwrap();
        assert_eq!(module_type, ModuleType::CloudFormation);
    }

    #[test]
    fn test_autodetect_terraform() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("main.tf"), "").unwrap();

        let module_type = resolve(dir.path(), None, "app").unwrap();
        assert_eq!(module_type, ModuleType::Terraform);
    }

    #[test]
    fn test_autodetect_serverless_requires_package_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("serverless.yml"), "").unwrap();
        // Without package.json this falls through to the cloudformation
        // fallback on the yml file.
        let module_type = resolve(dir.path(), None, "app").unwrap();
        assert_eq!(module_type, ModuleType::CloudFormation);

        fs::write(dir.path().join("package.json"), "{}").unwrap();
        let module_type = resolve(dir.path(), None, "app").unwrap();
        assert_eq!(module_type, ModuleType::Serverless);
    }

    #[test]
    fn test_autodetect_cdk() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cdk.json"), "{}").unwrap();
        fs::write(dir.path().join("package.json"), "{}").unwrap();

        let module_type = resolve(dir.path(), None, "app").unwrap();
        assert_eq!(module_type, ModuleType::Cdk);
    }

    #[test]
    fn test_autodetect_kubernetes_overlays() {
        let dir = tempfile::tempdir().unwrap();
        let overlay = dir.path().join("overlays/dev");
        fs::create_dir_all(&overlay).unwrap();
        fs::write(overlay.join("kustomization.yaml"), "").unwrap();

        let module_type = resolve(dir.path(), None, "app").unwrap();
        assert_eq!(module_type, ModuleType::Kubernetes);
    }

    #[test]
    fn test_no_markers_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("README.md"), "").unwrap();

        let err = resolve(dir.path(), None, "app").unwrap_err();
        assert!(matches!(
            err,
            crate::error::RunwayError::Module(ModuleError::TypeUndetermined { .. })
        ));
    }
}
