use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use colored::Colorize;
use porter_store::{InMemoryEntityStore, ReaderExt};
use porter_transfer::{
    create_demo_project, default_export_filename, delete_all_data, export_project, import_document,
    read_document, write_document, DuplicatePolicy, ImportOptions, ImportReport,
};
use porter_types::{KindCounts, Project, User};
use serde_json::json;

use crate::cli::*;
use crate::config::PorterConfig;

/// Name given to demo projects created without `--name`.
const DEMO_PROJECT_NAME: &str = "Demo Project";

struct Session {
    db: PathBuf,
    config: PorterConfig,
    format: OutputFormat,
}

impl Session {
    fn open(&self) -> anyhow::Result<InMemoryEntityStore> {
        InMemoryEntityStore::open(&self.db)
            .with_context(|| format!("opening database {}", self.db.display()))
    }

    fn save(&self, store: &InMemoryEntityStore) -> anyhow::Result<()> {
        store
            .save(&self.db)
            .with_context(|| format!("saving database {}", self.db.display()))
    }

    fn json(&self) -> bool {
        self.format == OutputFormat::Json
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = PorterConfig::load(cli.config.as_deref())?;
    let ctx = Session {
        db: cli.db.clone().unwrap_or_else(|| config.database.clone()),
        config,
        format: cli.format,
    };
    match cli.command {
        Command::Export(args) => cmd_export(&ctx, args),
        Command::Import(args) => cmd_import(&ctx, args),
        Command::Demo(args) => cmd_demo(&ctx, args),
        Command::User(args) => cmd_user(&ctx, args),
        Command::Projects => cmd_projects(&ctx),
    }
}

fn cmd_export(ctx: &Session, args: ExportArgs) -> anyhow::Result<()> {
    let store = ctx.open()?;
    let indent = args.indent.unwrap_or(ctx.config.indent);
    let path = args.output.unwrap_or_else(|| {
        ctx.config
            .output_dir
            .join(default_export_filename(&args.project, Utc::now()))
    });
    let (bytes, counts) = export_to(&store, &args.project, &path, indent)?;

    if ctx.json() {
        let out = json!({
            "project": args.project,
            "file": path,
            "bytes": bytes,
            "counts": counts,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }
    println!(
        "{} Exported {} to {} ({:.1} KB)",
        "✓".green().bold(),
        args.project.bold(),
        path.display().to_string().cyan(),
        bytes as f64 / 1024.0
    );
    print_counts(&counts);
    Ok(())
}

fn export_to(store: &InMemoryEntityStore, project: &str, path: &Path, indent: usize) -> anyhow::Result<(u64, KindCounts)> {
    let document = export_project(store, project)?;
    let bytes = write_document(path, &document, indent)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok((bytes, document.summary()))
}

fn cmd_import(ctx: &Session, args: ImportArgs) -> anyhow::Result<()> {
    let store = ctx.open()?;
    let document = read_document(&args.file)
        .with_context(|| format!("reading {}", args.file.display()))?;
    let options = ImportOptions {
        project_name: args.project_name,
        skip_images: args.skip_images,
        skip_ml_data: args.skip_ml_data,
        duplicate_policy: if args.strict_duplicates {
            DuplicatePolicy::Strict
        } else {
            DuplicatePolicy::FirstSeen
        },
    };
    let report = import_document(&store, &store, &document, &args.user, &options)?;
    ctx.save(&store)?;
    print_import(ctx, &report)
}

fn print_import(ctx: &Session, report: &ImportReport) -> anyhow::Result<()> {
    if ctx.json() {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "{} Imported {} (#{}) for {}",
        "✓".green().bold(),
        report.project_name.bold(),
        report.project_key,
        report.user.yellow()
    );
    println!("  Created:");
    print_counts(&report.created);
    if report.reused.total() > 0 {
        println!("  Reused existing:");
        print_counts(&report.reused);
    }
    if !report.skipped.is_empty() {
        let skipped: Vec<_> = report.skipped.iter().map(|k| k.label()).collect();
        println!("  Skipped: {}", skipped.join(", ").dimmed());
    }
    Ok(())
}

fn cmd_demo(ctx: &Session, args: DemoArgs) -> anyhow::Result<()> {
    let store = ctx.open()?;
    if args.delete {
        println!("{}", "! Deleting existing data !".yellow().bold());
        let deleted = delete_all_data(&store)?;
        print_counts(&deleted);
    }

    let owner = ensure_user(&store, &ctx.config.demo_owner_email)?;
    let name = match &args.from_export {
        Some(file) => {
            let document = read_document(file)
                .with_context(|| format!("reading {}", file.display()))?;
            let options = ImportOptions {
                project_name: args.name.clone(),
                ..Default::default()
            };
            let report = import_document(&store, &store, &document, &owner.email, &options)?;
            print_import(ctx, &report)?;
            report.project_name
        }
        None => {
            let requested = args.name.as_deref().unwrap_or(DEMO_PROJECT_NAME);
            let demo = create_demo_project(&store, &owner, requested)?;
            if ctx.json() {
                println!("{}", serde_json::to_string_pretty(&demo)?);
            } else {
                println!("{} Created demo project {}", "✓".green().bold(), demo.name.bold());
                print_counts(&demo.created);
            }
            demo.name
        }
    };
    ctx.save(&store)?;

    if let Some(path) = &args.export {
        let (bytes, _) = export_to(&store, &name, path, ctx.config.indent)?;
        if !ctx.json() {
            println!(
                "{} Exported {} to {} ({:.1} KB)",
                "✓".green().bold(),
                name.bold(),
                path.display().to_string().cyan(),
                bytes as f64 / 1024.0
            );
        }
    }
    Ok(())
}

/// The registered user with `email`, registering it if needed.
fn ensure_user(store: &InMemoryEntityStore, email: &str) -> anyhow::Result<User> {
    if let Some(user) = store.users()?.into_iter().find(|u| u.email == email) {
        return Ok(user);
    }
    Ok(store.register_user(email)?)
}

fn cmd_user(ctx: &Session, args: UserArgs) -> anyhow::Result<()> {
    let store = ctx.open()?;
    match args.action {
        UserAction::Add { email } => {
            let user = store.register_user(&email)?;
            ctx.save(&store)?;
            if ctx.json() {
                println!("{}", serde_json::to_string_pretty(&user)?);
            } else {
                println!("{} Registered {} ({})", "✓".green().bold(), user.email.bold(), user.id.short_id().dimmed());
            }
        }
        UserAction::List => {
            let users = store.users()?;
            if ctx.json() {
                println!("{}", serde_json::to_string_pretty(&users)?);
            } else if users.is_empty() {
                println!("No users.");
            } else {
                for user in users {
                    println!("  {}  {}", user.id.short_id().dimmed(), user.email);
                }
            }
        }
    }
    Ok(())
}

fn cmd_projects(ctx: &Session) -> anyhow::Result<()> {
    let store = ctx.open()?;
    let projects = store.scan_records::<Project>()?;
    let users = store.users()?;
    let owner_of = |project: &Project| {
        project
            .owner
            .and_then(|id| users.iter().find(|u| u.id == id))
            .map(|u| u.email.clone())
    };

    if ctx.json() {
        let rows: Vec<_> = projects
            .iter()
            .map(|p| json!({"key": p.id, "name": p.name, "owner": owner_of(p)}))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }
    if projects.is_empty() {
        println!("No projects.");
    }
    for project in &projects {
        let owner = owner_of(project).unwrap_or_else(|| "-".into());
        println!("  {:>4}  {}  {}", project.id.to_string().yellow(), project.name.bold(), owner.dimmed());
    }
    Ok(())
}

fn print_counts(counts: &KindCounts) {
    for (kind, n) in counts.iter() {
        println!("    {:<22}{}", kind.label(), n.to_string().bold());
    }
}
