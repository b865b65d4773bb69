//! Command-line entry point: mounts either the in-memory store or an on-disk container at a
//! given mountpoint, using FUSE.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use fuser::MountOption;
use log::error;

use monofs::fuse_adapter::FuseAdapter;
use monofs::memory_fs::MemoryFs;
use monofs::volume;

/// `monofs --memory <mount>` or `monofs --container <path> <mount>`.
#[derive(Parser)]
#[command(name = "monofs", about = "A small single-directory POSIX-like file system")]
struct Cli {
    /// Mount a process-local, non-persistent file system. Takes the mountpoint.
    #[arg(long, value_name = "MOUNTPOINT", conflicts_with = "container")]
    memory: Option<PathBuf>,

    /// Mount a fixed-size container file, formatting it first if it does not exist. Takes the
    /// container path; the mountpoint is the positional argument.
    #[arg(long, value_name = "CONTAINER", requires = "mountpoint")]
    container: Option<PathBuf>,

    /// The mountpoint, required alongside `--container`.
    #[arg(value_name = "MOUNTPOINT")]
    mountpoint: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let options = vec![
        MountOption::FSName("monofs".to_string()),
        MountOption::AutoUnmount,
    ];

    let result = if let Some(mountpoint) = cli.memory {
        let adapter = FuseAdapter::labeled(MemoryFs::new(), "in-memory");
        fuser::mount2(adapter, &mountpoint, &options)
    } else if let (Some(container), Some(mountpoint)) = (cli.container, cli.mountpoint) {
        match volume::mount_container(&container) {
            Ok(vol) => {
                let adapter = FuseAdapter::labeled(vol, container.display().to_string());
                fuser::mount2(adapter, &mountpoint, &options)
            }
            Err(e) => {
                error!("failed to mount container {}: errno {e}", container.display());
                return ExitCode::FAILURE;
            }
        }
    } else {
        error!("usage: monofs --memory <mount> | monofs --container <path> <mount>");
        return ExitCode::FAILURE;
    };

    if let Err(e) = result {
        error!("mount failed: {e}");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
