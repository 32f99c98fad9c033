use anyhow::Result;
use clap::{Parser, Subcommand};
use spool_daemon::config::Config;
use spool_daemon::errors::SpoolError;
use spool_daemon::ipc::IpcServer;
use spool_daemon::registry::{parse_args, Context, Registry};
use spool_daemon::{basic, dispatch, logging};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "spool-daemon")]
#[command(about = "Command registry daemon with nested namespaces")]
struct Cli {
    /// Project directory handed to commands (overrides SPOOL_WORKDIR)
    #[arg(long, global = true)]
    workdir: Option<PathBuf>,
    /// Emit structured JSON log lines
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the registry over the IPC socket
    Serve {
        #[arg(long)]
        socket: Option<PathBuf>,
    },
    /// Print every registered command as JSON
    List,
    /// Resolve a command path and invoke it
    Call {
        /// Named argument, repeatable
        #[arg(short = 'a', long = "arg", value_name = "KEY=VALUE")]
        args: Vec<String>,
        /// Path segments; trailing `key=value` segments become arguments
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        path: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(workdir) = cli.workdir {
        config.workdir = workdir;
    }
    config.json_logs |= cli.json_logs;
    logging::init(config.json_logs);

    let registry = basic::registry()?;
    let context = Context::new(&config.workdir);

    match cli.command {
        Command::Serve { socket } => {
            if let Some(socket) = socket {
                config.socket_path = socket;
            }
            config.ensure_socket_dir()?;

            let server = IpcServer::new(
                config.socket_path.clone(),
                Arc::new(registry),
                Arc::new(context),
            );
            log::info!("Spool daemon starting in {}", config.workdir.display());
            server.run().await?;
        }
        Command::List => {
            println!("{}", serde_json::to_string_pretty(&registry.list())?);
        }
        Command::Call { args, path } => {
            if let Err(err) = call(&registry, &context, &args, &path) {
                let error = SpoolError::from(err);
                eprintln!("{}", serde_json::to_string_pretty(&error)?);
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

fn call(registry: &Registry, context: &Context, args: &[String], path: &[String]) -> Result<()> {
    let args = parse_args(args)?;
    let outcome = dispatch::call(registry, path, args, context)?;
    println!("{}", serde_json::to_string_pretty(&dispatch::render(&outcome))?);
    Ok(())
}
