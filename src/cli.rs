use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::Overrides;
use crate::util::DiskSize;

#[derive(Parser, Debug)]
#[command(name = "vmmgr", about = "Disposable VMs from libvirt template images", version)]
pub struct Cli {
    /// Path to config file [default: ~/.config/vmmgr/config.toml]
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Libvirt pool holding the instances this tool creates
    #[arg(long, global = true, env = "VMMGR_POOL")]
    pub pool: Option<String>,

    /// Comma-separated libvirt pools searched for template images
    #[arg(long, global = true, env = "VMMGR_TEMPLATE_IMAGES_POOLS")]
    pub template_pools: Option<String>,

    /// Where cloud-init seed files are staged
    #[arg(long, global = true, env = "XDG_RUNTIME_DIR", hide = true)]
    pub runtime_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            config: self.config.clone(),
            pool: self.pool.clone(),
            template_pools: self.template_pools.clone(),
            runtime_dir: self.runtime_dir.clone(),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new virtual machine from a template image
    Create {
        /// Template image name prefix
        pattern: Option<String>,

        /// List available template images instead of creating a VM
        #[arg(long)]
        list: bool,

        /// Print external commands without running them
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Virtual disk size of the new image (e.g. 20G)
        #[arg(long)]
        disk_size: Option<DiskSize>,

        /// cloud-init user-data file to use
        #[arg(long)]
        cloud_init: Option<PathBuf>,

        /// Extra arguments passed to virt-install (after `--`)
        #[arg(last = true, allow_hyphen_values = true)]
        extra_args: Vec<String>,
    },

    /// Delete virtual machines created by this tool
    Delete {
        /// Delete every managed virtual machine
        #[arg(long, conflicts_with = "names")]
        all: bool,

        /// Print external commands without running them
        #[arg(short = 'n', long)]
        dry_run: bool,

        /// Names of the virtual machines to delete
        names: Vec<String>,
    },

    /// List virtual machines created by this tool
    List {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = ListFormat::Table)]
        format: ListFormat,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListFormat {
    /// Aligned columns
    Table,
    /// `VM_NAME=`/`VM_USER=`/`IP_ADDR=` blocks for `eval`
    Shell,
    /// Ansible inventory lines
    Ansible,
    /// JSON array
    Json,
}
