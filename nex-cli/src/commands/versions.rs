use crate::client::RegistryClient;
use crate::config::Config;
use crate::types::Result;
use crate::utils::*;
use colored::*;

/// List published versions, newest first
pub async fn handle_versions(package: String) -> Result<()> {
    let (id, _) = parse_package_spec(&package);

    let config = Config::load()?;
    let client = RegistryClient::new(&config)?;
    let spinner = create_spinner(&format!("Fetching versions of {}...", id));
    let versions = client.versions(&id).await;
    spinner.finish_and_clear();
    let versions = versions?;

    println!("\n{} {}", "🏷️  Versions of".cyan().bold(), id.green().bold());
    println!("{}", "─".repeat(80));
    for v in &versions {
        let mut line = format!(
            "  {}  {}  {} downloads",
            v.version.cyan(),
            v.published_at.format("%Y-%m-%d").to_string().dimmed(),
            v.downloads
        );
        if v.deprecated {
            line.push_str(&format!(" {}", "(deprecated)".yellow()));
        }
        println!("{}", line);
        if !v.changelog.is_empty() {
            println!("      {}", v.changelog);
        }
    }
    if versions.is_empty() {
        println!("  No versions published");
    }

    Ok(())
}
