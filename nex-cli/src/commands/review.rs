use crate::client::RegistryClient;
use crate::config::Config;
use crate::types::Result;
use crate::utils::*;
use colored::*;

/// Check review input before it is sent
pub fn validate_review(rating: u8, title: Option<&str>, comment: Option<&str>) -> Result<()> {
    if !(1..=5).contains(&rating) {
        return Err("Rating must be between 1 and 5".into());
    }
    if title.map(|t| t.chars().count() > 100).unwrap_or(false) {
        return Err("Title must be at most 100 characters".into());
    }
    if comment.map(|c| c.chars().count() > 1000).unwrap_or(false) {
        return Err("Comment must be at most 1000 characters".into());
    }
    Ok(())
}

/// Create, update or delete the caller's review of a package
pub async fn handle_review(
    package: String,
    rating: Option<u8>,
    title: Option<String>,
    comment: Option<String>,
    delete: bool,
) -> Result<()> {
    let (id, _) = parse_package_spec(&package);
    let config = Config::load()?;
    let client = RegistryClient::new(&config)?;

    if delete {
        let message = client.delete_review(&id).await?;
        print_success(&message);
        return Ok(());
    }

    let rating = rating.ok_or("Pass --rating <1-5> or --delete")?;
    validate_review(rating, title.as_deref(), comment.as_deref())?;

    let spinner = create_spinner("Submitting review...");
    let result = client
        .submit_review(&id, rating, title.as_deref(), comment.as_deref())
        .await;
    spinner.finish_and_clear();
    let message = result?;

    print_success(&format!("{} {}", message, stars(rating as f64).yellow()));
    Ok(())
}
