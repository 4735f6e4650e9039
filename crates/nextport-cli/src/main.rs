mod commands;
mod config;
mod display;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use tracing::Level;

use config::{BatchArgs, ConnectionArgs, PathArgs};

#[derive(Parser)]
#[command(name = "nextport")]
#[command(version)]
#[command(about = "Export, patch, and deploy Vitec Next document templates", long_about = None)]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,

    #[command(flatten)]
    paths: PathArgs,

    /// Log at debug level
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the next batch of a full template export
    Export {
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Fetch the next batch of a patch run over selected ids
    Patch {
        #[command(flatten)]
        batch: BatchArgs,
        /// Template ids, comma separated
        #[arg(long, value_delimiter = ',', conflicts_with_all = ["ids_file", "from_export"])]
        ids: Vec<String>,
        /// File with one template id per line (`#` starts a comment)
        #[arg(long, conflicts_with = "from_export")]
        ids_file: Option<PathBuf>,
        /// Patch every template an earlier export left without content
        #[arg(long)]
        from_export: Option<PathBuf>,
    },
    /// Fill missing content in an export from a patch file
    ApplyPatch {
        #[arg(long)]
        export: PathBuf,
        #[arg(long)]
        patch: PathBuf,
        /// Output path (default: `<export>.patched.json`)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Back up and overwrite one template's content
    Deploy {
        /// Template to overwrite; omit both flags to retry the staged deploy
        #[arg(long, requires = "html_file")]
        id: Option<String>,
        /// HTML file with the new content
        #[arg(long, requires = "id")]
        html_file: Option<PathBuf>,
    },
    /// Restore a template from its deploy backup
    Rollback {
        #[arg(long)]
        id: String,
    },
    /// Show stored runs, staged deploys, and backups
    Status,
    /// Discard a stored run or staged deploy
    Reset { target: Target },
    /// Drop one id from a stored run so the next batch fetches it again
    Forget {
        target: RunTarget,
        #[arg(long)]
        id: String,
    },
    /// List merge fields used across an export
    Fields {
        export: PathBuf,
        /// Only show fields used by at least this many templates
        #[arg(long, default_value_t = 1)]
        min_count: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Target {
    Export,
    Patch,
    Deploy,
}

#[derive(Clone, Copy, ValueEnum)]
enum RunTarget {
    Export,
    Patch,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .init();
    tracing::info!("nextport v{}", env!("CARGO_PKG_VERSION"));

    let paths = &cli.paths;
    match cli.command {
        Command::Export { batch } => {
            let api = cli.connection.client()?;
            commands::export(&api, paths, &batch).await?;
        }
        Command::Patch {
            batch,
            ids,
            ids_file,
            from_export,
        } => {
            let ids =
                commands::resolve_patch_ids(ids, ids_file.as_deref(), from_export.as_deref())?;
            let api = cli.connection.client()?;
            commands::patch(&api, paths, &batch, ids).await?;
        }
        Command::ApplyPatch { export, patch, out } => {
            commands::apply_patch(&export, &patch, out.as_deref())?;
        }
        Command::Deploy { id, html_file } => {
            let api = cli.connection.client()?;
            let outcome = commands::deploy(&api, paths, id, html_file.as_deref()).await?;
            return Ok(commands::deploy_exit_code(&outcome));
        }
        Command::Rollback { id } => {
            let api = cli.connection.client()?;
            let outcome = commands::rollback(&api, paths, &id).await?;
            return Ok(commands::deploy_exit_code(&outcome));
        }
        Command::Status => commands::status(paths)?,
        Command::Reset { target } => commands::reset(paths, target)?,
        Command::Forget { target, id } => commands::forget(paths, target, &id)?,
        Command::Fields { export, min_count } => commands::fields(&export, min_count)?,
    }

    Ok(ExitCode::SUCCESS)
}
