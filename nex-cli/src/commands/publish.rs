use crate::client::RegistryClient;
use crate::config::Config;
use crate::types::Result;
use crate::utils::*;
use colored::*;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Manifest file names, in lookup order
const MANIFEST_NAMES: [&str; 2] = ["nex.json", "manifest.json"];

pub fn find_manifest(dir: &Path) -> Result<PathBuf> {
    MANIFEST_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
        .ok_or_else(|| format!("No nex.json found in {}. Run 'nex init' first.", dir.display()).into())
}

/// Apply CLI overrides to a manifest document and check the fields the registry requires.
pub fn prepare_manifest(
    mut manifest: Value,
    version: Option<String>,
    changelog: Option<String>,
) -> Result<Value> {
    let fields = manifest
        .as_object_mut()
        .ok_or("Manifest must be a JSON object")?;

    if let Some(version) = version {
        fields.insert("version".to_string(), Value::String(version));
    }
    if let Some(changelog) = changelog {
        fields.insert("changelog".to_string(), Value::String(changelog));
    }

    let field = |key: &str| fields.get(key).and_then(Value::as_str).unwrap_or("").to_string();
    let (id, name, version) = (field("id"), field("name"), field("version"));

    if id.is_empty() || name.is_empty() || version.is_empty() {
        return Err("Manifest must have id, name, and version".into());
    }
    if !validate_package_id(&id) {
        return Err(format!("Invalid package id '{}'. Use lowercase letters, digits, dots and hyphens.", id).into());
    }
    if !validate_version(&version) {
        return Err(format!("Invalid version '{}'. Use semantic versioning (e.g., 1.0.0)", version).into());
    }

    Ok(manifest)
}

pub async fn handle_publish(path: PathBuf, version: Option<String>, changelog: Option<String>) -> Result<()> {
    let manifest_path = find_manifest(&path)?;
    let content = std::fs::read_to_string(&manifest_path)?;
    let manifest: Value = serde_json::from_str(&content)
        .map_err(|e| format!("Invalid {}: {}", manifest_path.display(), e))?;
    let manifest = prepare_manifest(manifest, version, changelog)?;

    let id = manifest["id"].as_str().unwrap_or_default().to_string();
    let version = manifest["version"].as_str().unwrap_or_default().to_string();
    print_info(&format!("Publishing {} v{}", id.cyan(), version.cyan()));

    let config = Config::load()?;
    let client = RegistryClient::new(&config)?;

    let spinner = create_spinner("Uploading manifest to registry...");
    let result = client.publish(&manifest).await;
    spinner.finish_and_clear();
    let result = result?;

    if result.created {
        print_success(&format!("Published new package {}@{}", result.id.green().bold(), result.version.green()));
    } else {
        print_success(&format!("Published {}@{}", result.id.green().bold(), result.version.green()));
    }
    println!("\n{}", "📦 Install with:".yellow());
    println!("  {}", format!("nex install {}", result.id).cyan());

    Ok(())
}
