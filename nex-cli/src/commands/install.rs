use crate::client::RegistryClient;
use crate::config::Config;
use crate::types::Result;
use crate::utils::*;
use colored::*;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Write a fetched manifest to `<packages_dir>/<id>/nex.json`.
pub fn store_manifest(packages_dir: &Path, id: &str, manifest: &Value) -> Result<PathBuf> {
    let package_dir = packages_dir.join(id);
    std::fs::create_dir_all(&package_dir)?;
    let manifest_path = package_dir.join("nex.json");
    std::fs::write(&manifest_path, serde_json::to_string_pretty(manifest)? + "\n")?;
    Ok(manifest_path)
}

/// Install a package manifest from the registry
pub async fn handle_install(package_spec: String) -> Result<()> {
    let (id, version) = parse_package_spec(&package_spec);
    if !validate_package_id(&id) {
        return Err(format!("Invalid package id '{}'", id).into());
    }

    println!("\n{}", "📥 Installing from registry".cyan().bold());
    print_info(&format!("Package: {}", id.cyan()));

    let config = Config::load()?;
    let client = RegistryClient::new(&config)?;

    let spinner = create_spinner("🔍 Fetching package manifest...");
    let fetched = match &version {
        // A pinned version is read from the version history, then counted explicitly.
        Some(version) => match client.version_manifest(&id, version).await {
            Ok(manifest) => client
                .track_download(&id, Some(version.as_str()))
                .await
                .map(|_| manifest),
            Err(e) => Err(e),
        },
        None => client.manifest(&id).await,
    };
    spinner.finish_and_clear();
    let manifest = fetched.map_err(|e| format!("Could not fetch {}: {}", package_spec, e))?;

    let installed = store_manifest(&Config::packages_dir()?, &id, &manifest)?;
    let installed_version = manifest["version"].as_str().unwrap_or("unknown");

    print_success(&format!("Installed {}@{}", id.green().bold(), installed_version.green()));
    println!("\n{}", "📦 Installation Details:".cyan().bold());
    println!("  Manifest: {}", installed.display().to_string().yellow());
    if let Some(description) = manifest["description"].as_str() {
        println!("  Description: {}", description);
    }
    if let Some(runtime) = manifest["runtime"]["type"].as_str() {
        println!("  Runtime: {}", runtime.cyan());
    }
    if let Some(command) = manifest["commands"]["default"].as_str() {
        println!("  Run: {}", command.cyan());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stores_under_package_id() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = json!({"id": "alice.fmt", "version": "1.0.0"});
        let path = store_manifest(dir.path(), "alice.fmt", &manifest).unwrap();

        assert_eq!(path, dir.path().join("alice.fmt").join("nex.json"));
        let written: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(written, manifest);
    }
}
