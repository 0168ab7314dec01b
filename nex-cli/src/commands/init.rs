use crate::types::{Author, NexManifest, Result, Runtime};
use crate::utils::*;
use colored::*;
use std::io::Write;
use std::path::Path;

pub const MANIFEST_FILE: &str = "nex.json";

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Assemble the manifest `nex init` writes; the id is `author.name`.
pub fn build_manifest(
    name: &str,
    author: &str,
    description: &str,
    runtime: &str,
    entrypoint: &str,
) -> NexManifest {
    NexManifest {
        id: format!("{}.{}", author, name),
        name: name.to_string(),
        version: "0.1.0".to_string(),
        description: description.to_string(),
        author: Author {
            name: author.to_string(),
            github: Some(author.to_string()),
        },
        license: "MIT".to_string(),
        repository: Some(format!("https://github.com/{}/{}", author, name)),
        runtime: Runtime {
            kind: runtime.to_string(),
            version: None,
        },
        entrypoint: entrypoint.to_string(),
        commands: default_commands(runtime, entrypoint),
        keywords: Vec::new(),
    }
}

/// Initialize a new package manifest in the current directory
pub async fn handle_init() -> Result<()> {
    print_info("Creating a new nex package...");

    if Path::new(MANIFEST_FILE).exists() {
        return Err(format!("{} already exists!", MANIFEST_FILE).into());
    }

    let name = sanitize_name(&prompt("\n📦 Package name: ")?);
    if name.is_empty() {
        return Err("Package name is required".into());
    }

    let author = sanitize_name(&prompt("👤 Your username: ")?);
    if author.is_empty() {
        return Err("Username is required".into());
    }

    let description = prompt("📝 Description: ")?;

    let runtime = prompt("⚙️  Runtime (python/node/bash) [python]: ")?;
    let runtime = if runtime.is_empty() { "python".to_string() } else { runtime };

    let suggested = default_entrypoint(&runtime, &name);
    let entrypoint = prompt(&format!("📄 Entry file [{}]: ", suggested))?;
    let entrypoint = if entrypoint.is_empty() { suggested } else { entrypoint };

    let manifest = build_manifest(&name, &author, &description, &runtime, &entrypoint);
    if !validate_package_id(&manifest.id) {
        return Err(format!("'{}' is not a valid package id", manifest.id).into());
    }

    let json = serde_json::to_string_pretty(&manifest)?;
    std::fs::write(MANIFEST_FILE, json + "\n")?;

    print_success(&format!("Created {} for {}", MANIFEST_FILE, manifest.id.bold()));

    println!("\n{}", "🚀 Next Steps:".cyan().bold());
    println!("  1. Write your tool in {}", entrypoint.cyan());
    println!("  2. Log in with a registry token: {}", "nex login <token>".cyan());
    println!("  3. Publish: {}", "nex publish".cyan());

    Ok(())
}
