use crate::config::Config;
use crate::types::Result;
use crate::utils::*;
use colored::*;

/// Store an API token issued by a registry admin
pub async fn handle_login(token: String) -> Result<()> {
    let token = token.trim().to_string();
    if token.is_empty() {
        return Err("Token cannot be empty".into());
    }
    let mut config = Config::load()?;
    config.token = Some(token);
    config.save()?;
    print_success(&format!("Token saved for {}", config.registry_base().cyan()));
    Ok(())
}

/// Show configuration, or update the registry URL
pub async fn handle_config(registry: Option<String>) -> Result<()> {
    let mut config = Config::load()?;

    if let Some(url) = registry {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err("Registry URL must start with http:// or https://".into());
        }
        config.registry_url = url;
        config.save()?;
        print_success(&format!("Registry set to {}", config.registry_base().cyan()));
        return Ok(());
    }

    println!("\n{}", "⚙️  Configuration".cyan().bold());
    println!("  File: {}", Config::config_dir()?.join("config.toml").display());
    println!("  Registry: {}", config.registry_base().cyan());
    let token_state = if config.token.is_some() { "set".green() } else { "not set".yellow() };
    println!("  Token: {}", token_state);
    Ok(())
}
