use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;

mod client;
mod commands;
mod config;
mod types;
mod utils;

use commands::*;

#[derive(Parser)]
#[command(name = "nex")]
#[command(about = "nex - client for the Nex developer-tool registry", long_about = "
Publish, discover and install developer tools from a Nex registry.
• Publish nex.json manifests with an API token
• Search by name, description and tags
• Rate and review the tools you use
")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a nex.json manifest in the current directory
    Init,

    /// Publish a package manifest to the registry
    Publish {
        /// Path to package directory (defaults to current directory)
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Specify version (overrides manifest)
        #[arg(short, long)]
        version: Option<String>,

        /// Changelog entry for this version
        #[arg(short, long)]
        changelog: Option<String>,
    },

    /// Install a package manifest (e.g., alice.fmt or alice.fmt@1.0.0)
    Install {
        package: String,
    },

    /// Show package details, ratings and recent reviews
    Info {
        package: String,
    },

    /// Search for packages in the registry
    Search {
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value_t = 20)]
        limit: u32,
    },

    /// List the published versions of a package
    Versions {
        package: String,
    },

    /// Rate and review a package, or delete your review
    Review {
        package: String,

        /// Star rating from 1 to 5
        #[arg(short, long)]
        rating: Option<u8>,

        #[arg(short, long)]
        title: Option<String>,

        #[arg(short, long)]
        comment: Option<String>,

        /// Delete your review instead
        #[arg(long, conflicts_with_all = ["rating", "title", "comment"])]
        delete: bool,
    },

    /// Save an API token issued by a registry admin
    Login {
        token: String,
    },

    /// Show or change CLI configuration
    Config {
        /// Registry base URL
        #[arg(long)]
        registry: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init => init::handle_init().await,
        Commands::Publish { path, version, changelog } => publish::handle_publish(path, version, changelog).await,
        Commands::Install { package } => install::handle_install(package).await,
        Commands::Info { package } => info::handle_info(package).await,
        Commands::Search { query, limit } => search::handle_search(query, limit).await,
        Commands::Versions { package } => versions::handle_versions(package).await,
        Commands::Review { package, rating, title, comment, delete } => {
            review::handle_review(package, rating, title, comment, delete).await
        }
        Commands::Login { token } => login::handle_login(token).await,
        Commands::Config { registry } => login::handle_config(registry).await,
    };

    match result {
        Ok(_) => std::process::exit(0),
        Err(e) => {
            eprintln!("\n{} {}", "✗".red().bold(), e.to_string().red());
            std::process::exit(1);
        }
    }
}
