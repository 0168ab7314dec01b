use crate::client::RegistryClient;
use crate::config::Config;
use crate::types::Result;
use crate::utils::*;
use colored::*;

/// Show package details, rating summary and recent reviews
pub async fn handle_info(package: String) -> Result<()> {
    let (id, _) = parse_package_spec(&package);

    let spinner = create_spinner(&format!("Fetching {}...", id));
    let config = Config::load()?;
    let client = RegistryClient::new(&config)?;
    let info = client.info(&id).await;
    spinner.finish_and_clear();
    let info = info?;
    let pkg = &info.package;

    println!("\n{} {}", "📦".cyan(), pkg.id.green().bold());
    println!("{}", "═".repeat(80).cyan());

    println!("\n{}", "📋 Package Information".cyan().bold());
    println!("  Name: {}", pkg.name.green());
    println!("  Version: {}", pkg.version.cyan());
    println!("  Description: {}", pkg.description.as_deref().unwrap_or("No description"));
    println!("  Category: {}", pkg.category);
    if !pkg.tags.is_empty() {
        println!("  Tags: {}", pkg.tags.join(", ").dimmed());
    }

    if pkg.deprecated {
        println!("\n{}", "⚠️  Deprecated".yellow().bold());
        if let Some(message) = &pkg.deprecation_message {
            println!("  {}", message.yellow());
        }
        if let Some(replacement) = &pkg.replacement_package {
            println!("  Use instead: {}", replacement.cyan());
        }
    }

    println!("\n{}", "📈 Downloads".cyan().bold());
    println!("  Total: {}", pkg.downloads.to_string().yellow());
    println!("  Last 7 days: {}", pkg.weekly_downloads.to_string().yellow());
    println!("  Last 30 days: {}", pkg.monthly_downloads.to_string().yellow());

    println!("\n{}", "⭐ Ratings".cyan().bold());
    if pkg.total_ratings == 0 {
        println!("  No ratings yet");
    } else {
        println!(
            "  {} {:.1} ({} ratings)",
            stars(pkg.average_rating).yellow(),
            pkg.average_rating,
            pkg.total_ratings
        );
        for star in (1..=5).rev() {
            let count = pkg.rating_distribution.get(&star.to_string()).copied().unwrap_or(0);
            let width = (count * 30).checked_div(pkg.total_ratings).unwrap_or(0) as usize;
            println!("  {} {} {}", star, "█".repeat(width).yellow(), count);
        }
    }

    if !info.reviews.is_empty() {
        println!("\n{}", "💬 Recent Reviews".cyan().bold());
        for review in &info.reviews {
            println!(
                "  {} {} {}",
                stars(review.rating as f64).yellow(),
                review.username.green(),
                review.created_at.format("%Y-%m-%d").to_string().dimmed()
            );
            if let Some(title) = &review.title {
                println!("    {}", title.bold());
            }
            if let Some(comment) = &review.comment {
                println!("    {}", comment);
            }
        }
    }

    println!("\n{}", "═".repeat(80).cyan());
    println!("\n{}", "🚀 Quick Actions:".yellow().bold());
    println!("  Install: {}", format!("nex install {}", pkg.id).green());
    println!("  Review: {}", format!("nex review {} --rating 5", pkg.id).green());

    Ok(())
}
