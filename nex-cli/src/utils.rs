use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::time::Duration;

/// Create a spinner progress indicator
pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

/// Print success message
pub fn print_success(msg: &str) {
    println!("\n{} {}", "✓".green().bold(), msg.green());
}

/// Print info message
pub fn print_info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}

/// Print warning message
pub fn print_warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg.yellow());
}

/// Validate a registry package id (`author.name`, lowercase, digits, dots, hyphens)
pub fn validate_package_id(id: &str) -> bool {
    let re = regex::Regex::new(r"^[a-z0-9]([a-z0-9.-]*[a-z0-9])?$").unwrap();
    re.is_match(id) && id.len() <= 214
}

/// Validate semantic version format, with an optional pre-release suffix
pub fn validate_version(version: &str) -> bool {
    let re = regex::Regex::new(r"^\d+\.\d+\.\d+(-[0-9A-Za-z.-]+)?$").unwrap();
    re.is_match(version) && version.len() <= 32
}

/// Lowercase a name and replace anything but letters, digits and hyphens with a hyphen
pub fn sanitize_name(name: &str) -> String {
    name.trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect()
}

/// Parse package specification (id@version or just id)
pub fn parse_package_spec(spec: &str) -> (String, Option<String>) {
    match spec.split_once('@') {
        Some((id, version)) if !version.is_empty() => (id.to_string(), Some(version.to_string())),
        Some((id, _)) => (id.to_string(), None),
        None => (spec.to_string(), None),
    }
}

/// Entry file suggested for a runtime
pub fn default_entrypoint(runtime: &str, name: &str) -> String {
    match runtime {
        "python" => format!("{}.py", name),
        "node" => "index.js".to_string(),
        "bash" => format!("{}.sh", name),
        _ => "main".to_string(),
    }
}

/// `default` and `install` commands suggested for a runtime
pub fn default_commands(runtime: &str, entrypoint: &str) -> BTreeMap<String, String> {
    let mut commands = BTreeMap::new();
    match runtime {
        "python" => {
            commands.insert("default".to_string(), format!("python {}", entrypoint));
            commands.insert("install".to_string(), "pip install -r requirements.txt".to_string());
        }
        "node" => {
            commands.insert("default".to_string(), format!("node {}", entrypoint));
            commands.insert("install".to_string(), "npm install".to_string());
        }
        _ => {
            commands.insert("default".to_string(), format!("./{}", entrypoint));
        }
    }
    commands
}

/// Render an average rating as five stars
pub fn stars(average: f64) -> String {
    let filled = average.round().clamp(0.0, 5.0) as usize;
    format!("{}{}", "★".repeat(filled), "☆".repeat(5 - filled))
}
