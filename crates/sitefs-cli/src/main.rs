//! sitefs: inspect the layered source views of a site.
//!
//! ```bash
//! sitefs --config site.toml views
//! sitefs ls content blog
//! sitefs stat layouts _default/single.html
//! sitefs walk static
//! sitefs watch --json
//! ```
//!
//! Logging goes to stderr and honours `RUST_LOG` (default `sitefs=info`).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use sitefs::vfs::DirEntry;
use sitefs::{BaseFs, SiteConfig, SourceFilesystem, Visit, WalkEvent, Walkway};

#[derive(Debug, Parser)]
#[command(name = "sitefs")]
#[command(about = "Inspect the layered filesystems of a site")]
#[command(version)]
struct Cli {
    /// Site configuration file.
    #[arg(short, long, default_value = "site.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List every view with its root directories.
    Views,
    /// List a directory of a view.
    Ls {
        view: String,
        #[arg(default_value = "")]
        path: String,
    },
    /// Show the attributes of one entry.
    Stat { view: String, path: String },
    /// Walk a view and print every file.
    Walk {
        view: String,
        #[arg(default_value = "")]
        path: String,
    },
    /// Print the directories a file watcher should watch.
    Watch {
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sitefs=info")))
        .init();

    let cli = Cli::parse();

    let config = SiteConfig::load_from(&cli.config)
        .with_context(|| format!("Failed to load site config {}", cli.config.display()))?;
    tracing::debug!(working_dir = %config.working_dir.display(), "loaded site config");

    let base = BaseFs::build(&config)
        .await
        .context("Failed to build site filesystems")?;

    match cli.command {
        Command::Views => views(&base),
        Command::Ls { view, path } => ls(find_view(&base, &view)?, &path).await,
        Command::Stat { view, path } => stat(find_view(&base, &view)?, &path).await,
        Command::Walk { view, path } => walk(find_view(&base, &view)?, &path).await,
        Command::Watch { json } => watch(&base, json),
    }
}

fn find_view<'a>(base: &'a BaseFs, name: &str) -> Result<&'a SourceFilesystem> {
    base.sources().view(name).with_context(|| {
        let known: Vec<_> = base.sources().views().into_iter().map(|(n, _)| n).collect();
        format!("unknown view {name:?}; expected one of {}", known.join(", "))
    })
}

fn views(base: &BaseFs) -> Result<()> {
    for (name, view) in base.sources().views() {
        println!("{name} ({})", view.fs().name());
        for dir in view.dirnames() {
            println!("  {}", dir.display());
        }
    }
    Ok(())
}

fn describe(entry: &DirEntry) -> String {
    let kind = if entry.is_dir() {
        "dir"
    } else if entry.is_symlink() {
        "link"
    } else {
        "file"
    };
    let lang = match entry.meta.lang() {
        "" => "-",
        lang => lang,
    };
    let filename = entry
        .meta
        .filename()
        .map(|f| f.display().to_string())
        .unwrap_or_default();
    format!(
        "{kind:<4} {lang:<4} {:>2} {:<32} {filename}",
        entry.meta.weight(),
        entry.name
    )
}

async fn ls(view: &SourceFilesystem, path: &str) -> Result<()> {
    let entries = view
        .fs()
        .read_dir(path)
        .await
        .with_context(|| format!("Failed to list {}:{path}", view.name()))?;
    for entry in &entries {
        println!("{}", describe(entry));
    }
    Ok(())
}

async fn stat(view: &SourceFilesystem, path: &str) -> Result<()> {
    let entry = view
        .fs()
        .stat(path)
        .await
        .with_context(|| format!("Failed to stat {}:{path}", view.name()))?;
    let meta = &entry.meta;
    println!("name:        {}", entry.name);
    println!("size:        {}", entry.size);
    println!("path:        {}", meta.path());
    println!("filename:    {}", meta.filename().map(|f| f.display().to_string()).unwrap_or_default());
    println!("lang:        {}", meta.lang());
    println!("base name:   {}", meta.translation_base_name());
    println!("weight:      {}", meta.weight());
    println!("ordered:     {}", meta.is_ordered());
    println!("watch:       {}", meta.watch());
    println!("decorators:  {}", meta.decorator_trail());
    Ok(())
}

async fn walk(view: &SourceFilesystem, path: &str) -> Result<()> {
    let mut walker = Walkway::new(view.fs().clone(), path, |event| {
        match event {
            WalkEvent::Entry { path, entry } => {
                if !entry.is_dir() {
                    println!("{path}");
                }
            }
            WalkEvent::Error { path, error, .. } => {
                tracing::warn!(path, %error, "skipping");
            }
        }
        Ok(Visit::Continue)
    });
    walker
        .walk()
        .await
        .with_context(|| format!("Failed to walk {}:{path}", view.name()))
}

fn watch(base: &BaseFs, json: bool) -> Result<()> {
    let dirs = base.watch_dirs();
    if json {
        println!("{}", serde_json::to_string_pretty(&dirs)?);
        return Ok(());
    }
    for dir in &dirs {
        println!("{:<10} {}", dir.category, dir.filename.display());
    }
    Ok(())
}
