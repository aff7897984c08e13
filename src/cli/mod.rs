mod init;
mod invoke;
mod list;
mod serve;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing::debug;

use crate::errors::Result;

#[derive(Debug, Parser)]
#[command(
    name = "hookkit",
    version,
    about = "Runs document-processing webhook extensions locally or as an HTTP host"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List registered handlers
    List,
    /// Run one handler against a hook request
    Invoke(InvokeArgs),
    /// Serve every handler over HTTP
    Serve(ServeArgs),
    /// Write a config template
    Init(InitArgs),
}

#[derive(Debug, Args, Clone, Default)]
pub struct InvokeArgs {
    pub name: String,
    /// JSON request file; stdin when omitted
    #[arg(long)]
    pub request: Option<PathBuf>,
    /// Force configure mode
    #[arg(long, default_value_t = false)]
    pub configure: bool,
    #[arg(long)]
    pub variant: Option<String>,
    /// Skip mutating calls that handlers gate on `commit`
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Debug, Args, Clone, Default)]
pub struct ServeArgs {
    /// Overrides `listen_addr`
    #[arg(long)]
    pub addr: Option<String>,
}

#[derive(Debug, Args, Clone, Default)]
pub struct InitArgs {
    #[arg(long, default_value_t = false)]
    pub force: bool,
}

pub async fn dispatch() -> Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Command::List) {
        Command::List => list::execute()?,
        Command::Invoke(args) => invoke::execute(args).await?,
        Command::Serve(args) => serve::execute(args).await?,
        Command::Init(args) => init::execute(args)?,
    }
    debug!("command completed");
    Ok(())
}
