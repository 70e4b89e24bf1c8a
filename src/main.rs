use clap::Parser;
use tracing_subscriber::EnvFilter;

use vmmgr::backend;
use vmmgr::cli::{Cli, Command};
use vmmgr::commands::create::{self, CreateOptions};
use vmmgr::commands::delete::{self, Selection};
use vmmgr::commands::list;
use vmmgr::config::Settings;
use vmmgr::external::Runner;

#[tokio::main(flavor = "current_thread")]
async fn main() -> miette::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("vmmgr=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vmmgr=warn"))
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .init();

    let settings = Settings::load(cli.overrides())?;
    tracing::debug!(
        pool = %settings.pool,
        template_pools = ?settings.template_pools,
        runtime_dir = %settings.runtime_dir.display(),
        "settings loaded"
    );

    // Nothing connects to libvirt until a command asks for the inventory.
    let backend = backend::create_backend();

    match cli.command {
        Command::Create {
            pattern,
            list,
            dry_run,
            disk_size,
            cloud_init,
            extra_args,
        } => {
            let opts = CreateOptions {
                pattern,
                list,
                dry_run,
                disk_size,
                cloud_init,
                extra_args,
            };
            create::run(&backend, &settings, opts).await?;
        }
        Command::Delete {
            all,
            dry_run,
            names,
        } => {
            let selection = if all {
                Selection::All
            } else {
                Selection::Names(names)
            };
            delete::run(&backend, &settings, selection, Runner::new(dry_run)).await?;
        }
        Command::List { format } => list::run(&backend, &settings, format)?,
    }

    Ok(())
}
