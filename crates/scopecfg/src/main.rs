//! Admin command line for scopecfg stores.

use anyhow::{Context, bail};
use chrono::{Duration, Utc};
use clap::{Args, Parser, Subcommand};
use log::{debug, info};
use scopecfg::config::ScopecfgConfig;
use scopecfg::core::{ApiKeyGate, ConfigMerger, flatten_str, render_document, unflatten};
use scopecfg::protocol::{ApiKeyId, ApplicationId, FlatEntry, Scope, TagId};
use scopecfg::store::{ScopeCatalog, open_store};
use std::path::{Path, PathBuf};

/// Command-line options for the admin client.
#[derive(Debug, Parser)]
#[command(name = "scopecfg", version)]
struct Cli {
    /// Optional path to a scopecfg.json5 config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the flat rows of a JSON document
    Flatten { file: PathBuf },
    /// Rebuild a document from a JSON array of flat rows
    Unflatten { file: PathBuf },
    /// Print the merged document for a scope
    Merged(ScopeArgs),
    /// Print the document stored for exactly one scope
    Exact(ScopeArgs),
    /// Replace the document stored for exactly one scope
    Save {
        #[command(flatten)]
        scope: ScopeArgs,
        file: PathBuf,
    },
    /// Authenticate an API key and print its merged document
    ApiKey { id: ApiKeyId },
    /// Print the stored JSON schema of an application
    Schema { application_id: ApplicationId },
    /// Register an application
    AddApplication {
        name: String,
        /// JSON schema file for the application's configuration
        #[arg(long)]
        schema: Option<PathBuf>,
    },
    /// Register a tag
    AddTag {
        name: String,
        /// Tag group (deployment dimension)
        #[arg(long)]
        group: String,
    },
    /// Issue an API key
    AddApiKey {
        #[arg(long)]
        app: ApplicationId,
        #[arg(long = "tag")]
        tags: Vec<TagId>,
        /// Days until the key expires; open-ended when omitted
        #[arg(long)]
        days: Option<i64>,
    },
}

#[derive(Debug, Args)]
struct ScopeArgs {
    /// Application id (repeatable)
    #[arg(long = "app")]
    apps: Vec<ApplicationId>,
    /// Tag id (repeatable)
    #[arg(long = "tag")]
    tags: Vec<TagId>,
}

impl ScopeArgs {
    fn scope(&self) -> Scope {
        Scope::new(self.apps.iter().copied(), self.tags.iter().copied())
    }
}

/// Entry point for the scopecfg admin client.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    scopecfg::init_logging();
    let cli = Cli::parse();
    debug!("starting cli (config_set={})", cli.config.is_some());

    let config = load_config(cli.config.as_deref())?;
    let pretty = config.output.pretty;
    match cli.command {
        Command::Flatten { file } => {
            let entries = flatten_str(&read(&file)?).context("failed to flatten document")?;
            println!("{}", render_document(&serde_json::to_value(entries)?, pretty)?);
        }
        Command::Unflatten { file } => {
            let entries: Vec<FlatEntry> =
                serde_json::from_str(&read(&file)?).context("expected a JSON array of rows")?;
            let document = unflatten(&entries).context("failed to rebuild document")?;
            println!("{}", render_document(&document, pretty)?);
        }
        command => run_store_command(command, &config).await?,
    }
    Ok(())
}

async fn run_store_command(command: Command, config: &ScopecfgConfig) -> anyhow::Result<()> {
    let handles = open_store(&config.store).context("failed to open store")?;
    let catalog = handles.catalog.clone();
    let merger = ConfigMerger::from_handles(handles);
    let pretty = config.output.pretty;
    match command {
        Command::Merged(args) => {
            let document = merger.get_merged_config(&args.scope()).await?;
            println!("{}", render_document(&document, pretty)?);
        }
        Command::Exact(args) => {
            let document = merger.get_exact_config(&args.scope()).await?;
            println!("{}", render_document(&document, pretty)?);
        }
        Command::Save { scope, file } => {
            let summary = merger
                .save_config(&scope.scope(), &read(&file)?)
                .await
                .context("failed to save config")?;
            println!("{}", render_document(&serde_json::to_value(summary)?, pretty)?);
        }
        Command::ApiKey { id } => {
            let gate = ApiKeyGate::from_config(catalog, &config.auth);
            gate.authenticate(id, Utc::now()).await?;
            let document = merger.get_merged_config_for_api_key(id).await?;
            println!("{}", render_document(&document, pretty)?);
        }
        Command::Schema { application_id } => {
            if let Some(schema) = merger.application_schema(application_id).await? {
                println!("{schema}");
            }
        }
        Command::AddApplication { name, schema } => {
            let schema = schema.as_deref().map(read).transpose()?;
            let application = merger.add_application(&name, schema.as_deref()).await?;
            println!("{}", application.id);
        }
        Command::AddTag { name, group } => {
            let tag = merger.add_tag(&name, &group).await?;
            println!("{}", tag.id);
        }
        Command::AddApiKey { app, tags, days } => {
            let now = Utc::now();
            let until = match days {
                Some(days) if days <= 0 => bail!("--days must be positive"),
                Some(days) => Some(now + Duration::days(days)),
                None => None,
            };
            let key = catalog
                .insert_api_key(app, &tags, now, until)
                .await
                .context("failed to issue api key")?;
            info!("api key issued (id={}, application={app})", key.id);
            println!("{}", key.id);
        }
        Command::Flatten { .. } | Command::Unflatten { .. } => {}
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ScopecfgConfig> {
    if let Some(path) = path {
        return ScopecfgConfig::load_from_path(path).context("failed to load config");
    }
    let cwd = std::env::current_dir().context("cwd")?;
    let layered = ScopecfgConfig::load_layered(&cwd).context("failed to load layered config")?;
    Ok(layered.config)
}

fn read(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use scopecfg::protocol::Scope;

    #[test]
    fn scope_flags_repeat() {
        let cli = Cli::try_parse_from([
            "scopecfg", "merged", "--app", "3", "--app", "1", "--tag", "7",
        ])
        .expect("parse");
        let Command::Merged(args) = cli.command else {
            panic!("expected merged");
        };
        assert_eq!(args.scope(), Scope::new([1, 3], [7]));
    }

    #[test]
    fn save_takes_scope_and_file() {
        let cli = Cli::try_parse_from([
            "scopecfg", "--config", "cfg.json5", "save", "--app", "2", "doc.json",
        ])
        .expect("parse");
        assert!(cli.config.is_some());
        let Command::Save { scope, file } = cli.command else {
            panic!("expected save");
        };
        assert_eq!(scope.scope(), Scope::single_tag([2], None));
        assert_eq!(file.to_string_lossy(), "doc.json");
    }
}
