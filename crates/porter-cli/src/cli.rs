use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "porter",
    about = "Porter: move monitoring projects between databases",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Database snapshot file (default from config, then `porter.json`)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Configuration file (default `./porter.toml` when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Export a project to a JSON document
    Export(ExportArgs),
    /// Import a project from a JSON document
    Import(ImportArgs),
    /// Create a demo project
    Demo(DemoArgs),
    /// Manage user accounts
    User(UserArgs),
    /// List projects
    Projects,
}

#[derive(Args)]
pub struct ExportArgs {
    /// Name of the project to export
    pub project: String,
    /// Output file (default `<slug>_export_<timestamp>.json`)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// JSON indentation; 0 writes compact JSON
    #[arg(long)]
    pub indent: Option<usize>,
}

#[derive(Args)]
pub struct ImportArgs {
    /// Export document to read
    pub file: PathBuf,
    /// Email of the user who will own the new project
    #[arg(long)]
    pub user: String,
    /// Name for the new project (default: name in the document)
    #[arg(short = 'n', long = "name")]
    pub project_name: Option<String>,
    /// Leave out source images and everything that requires them
    #[arg(long)]
    pub skip_images: bool,
    /// Leave out detections, classifications, occurrences and identifications
    #[arg(long)]
    pub skip_ml_data: bool,
    /// Fail when two shared records with one natural key differ
    #[arg(long)]
    pub strict_duplicates: bool,
}

#[derive(Args)]
pub struct DemoArgs {
    /// Delete all existing records first
    #[arg(long)]
    pub delete: bool,
    /// Import the demo project from an export document instead of seeding it
    #[arg(long)]
    pub from_export: Option<PathBuf>,
    /// Export the created project to this file afterwards
    #[arg(long)]
    pub export: Option<PathBuf>,
    /// Project name
    #[arg(long)]
    pub name: Option<String>,
}

#[derive(Args)]
pub struct UserArgs {
    #[command(subcommand)]
    pub action: UserAction,
}

#[derive(Subcommand)]
pub enum UserAction {
    /// Register a user
    Add { email: String },
    /// List registered users
    List,
}
