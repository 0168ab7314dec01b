use crate::client::RegistryClient;
use crate::config::Config;
use crate::types::Result;
use crate::utils::*;
use colored::*;

/// Search for packages in the registry
pub async fn handle_search(query: String, limit: u32) -> Result<()> {
    println!("\n{}", "🔍 Searching registry".cyan().bold());
    let spinner = create_spinner(&format!("Searching for '{}'...", query));

    let config = Config::load()?;
    let client = RegistryClient::new(&config)?;
    let results = client.search(&query, limit).await;
    spinner.finish_and_clear();
    let results = results?;

    if results.is_empty() {
        print_warning(&format!("No packages found matching '{}'", query));
        println!("\n{}", "💡 Tips:".yellow());
        println!("  • Check your spelling");
        println!("  • Try broader search terms");
        println!("  • Use 'nex info <package>' if you know the exact id");
        return Ok(());
    }

    println!("\n{} {}", "📦 Found".cyan().bold(), format!("{} packages", results.len()).green());
    println!("{}", "─".repeat(80));

    for pkg in &results {
        let mut heading = format!("{} {}", pkg.id.green().bold(), pkg.version.cyan());
        if pkg.deprecated {
            heading.push_str(&format!(" {}", "(deprecated)".yellow()));
        }
        println!("\n{} {}", "📦".cyan(), heading);
        println!("  {}", pkg.description.as_deref().unwrap_or("No description"));
        println!(
            "  Downloads: {}  Rating: {} ({})",
            pkg.downloads.to_string().yellow(),
            stars(pkg.average_rating).yellow(),
            pkg.total_ratings
        );
    }

    println!("\n{}", "─".repeat(80));
    println!("\n{}", "💡 To install:".yellow());
    println!("  {}", "nex install <package-id>".cyan());

    Ok(())
}
