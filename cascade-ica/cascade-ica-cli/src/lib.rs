//! Command surface of the `cascade-ica` binary.
//!
//! Each invocation loads the configuration, opens the keyring once, wires the
//! RPC and mesh adapters, runs one workflow under a single deadline and prints
//! one JSON record to stdout.

pub mod logging;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use cascade_ica::report::emit;
use cascade_ica::rpc::{RpcHostLedger, RpcIcaTransport, TendermintClient};
use cascade_ica::{
    ActionWorkflow, Config, Deadline, HttpMesh, IcaCoordinator, KeyringProvider, LocalKeystore,
    ResolvedIdentity, UploadRequest, DEFAULT_COMMAND_TIMEOUT, MAX_COMMAND_TIMEOUT,
};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEFAULT_OUT_DIR: &str = ".";
const RPC_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_TIMEOUT_SECS: u64 = MAX_COMMAND_TIMEOUT.as_secs();

#[derive(Debug, Parser)]
#[command(
    name = "cascade-ica",
    about = "Cascade storage actions through an interchain account",
    version
)]
pub struct Cli {
    /// Path to the TOML configuration.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: String,
    /// Deadline for the whole command, in seconds (default 600).
    #[arg(
        long,
        global = true,
        value_name = "SECONDS",
        value_parser = clap::value_parser!(u64).range(1..=MAX_TIMEOUT_SECS)
    )]
    pub timeout: Option<u64>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Upload a file through the interchain account.
    Upload(UploadArgs),
    /// Download the artefact of an action.
    Download(DownloadArgs),
    /// Approve or inspect actions.
    Action {
        #[command(subcommand)]
        command: ActionCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ActionCommand {
    /// Approve an action from the interchain account.
    Approve(ApproveArgs),
    /// Show the on-chain record of an action.
    Status(StatusArgs),
}

#[derive(Debug, Args)]
pub struct UploadArgs {
    #[arg(value_name = "FILE")]
    pub file_arg: Option<String>,
    /// Path to the file to upload.
    #[arg(long = "file", value_name = "FILE")]
    pub file: Option<String>,
    /// Existing pending action to upload bytes for (skips the action request).
    #[arg(long)]
    pub action_id: Option<String>,
    /// Make the uploaded file publicly accessible.
    #[arg(long)]
    pub public: bool,
}

#[derive(Debug, Args)]
pub struct DownloadArgs {
    #[arg(value_name = "ACTION_ID")]
    pub action_id_arg: Option<String>,
    #[arg(long = "action-id", value_name = "ACTION_ID")]
    pub action_id: Option<String>,
    /// Output directory.
    #[arg(long, default_value = DEFAULT_OUT_DIR)]
    pub out: PathBuf,
}

#[derive(Debug, Args)]
pub struct ApproveArgs {
    #[arg(value_name = "ACTION_ID")]
    pub action_id_arg: Option<String>,
    #[arg(long = "action-id", value_name = "ACTION_ID")]
    pub action_id: Option<String>,
    /// Interchain account to approve from; queried when omitted.
    #[arg(long)]
    pub ica_address: Option<String>,
}

#[derive(Debug, Args)]
pub struct StatusArgs {
    #[arg(value_name = "ACTION_ID")]
    pub action_id_arg: Option<String>,
    #[arg(long = "action-id", value_name = "ACTION_ID")]
    pub action_id: Option<String>,
}

/// Take an operand from its flag or its positional slot, but not both.
pub fn resolve_optional_arg(
    flag: Option<&str>,
    positional: Option<&str>,
    name: &str,
) -> Result<String> {
    let flag = flag.map(str::trim).filter(|v| !v.is_empty());
    let positional = positional.map(str::trim).filter(|v| !v.is_empty());
    match (flag, positional) {
        (Some(_), Some(_)) => bail!("{name} provided both as flag and argument"),
        (Some(value), None) | (None, Some(value)) => Ok(value.to_string()),
        (None, None) => bail!("{name} is required"),
    }
}

impl Cli {
    pub fn deadline(&self) -> Deadline {
        Deadline::after(
            self.timeout
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT),
        )
    }

    pub fn load_config(&self) -> Result<Config> {
        let path = self.config.trim();
        if path.is_empty() {
            bail!("config path is required");
        }
        Ok(Config::load(path)?)
    }
}

/// Run one command to completion and print its record.
pub async fn run(cli: Cli) -> Result<()> {
    // Operands are checked before anything is loaded.
    let (flag, positional, name) = match &cli.command {
        Command::Upload(args) => (&args.file, &args.file_arg, "file"),
        Command::Download(args) => (&args.action_id, &args.action_id_arg, "action-id"),
        Command::Action {
            command: ActionCommand::Approve(args),
        } => (&args.action_id, &args.action_id_arg, "action-id"),
        Command::Action {
            command: ActionCommand::Status(args),
        } => (&args.action_id, &args.action_id_arg, "action-id"),
    };
    let operand = resolve_optional_arg(flag.as_deref(), positional.as_deref(), name)?;

    let config = cli.load_config()?;
    logging::init(config.host.log_level);
    let deadline = cli.deadline();
    let workflow = connect(&config, deadline)?;

    let stdout = std::io::stdout();
    match cli.command {
        Command::Upload(args) => {
            let request = UploadRequest {
                file: PathBuf::from(operand),
                public: args.public,
                action_id: args.action_id,
            };
            emit(stdout.lock(), &workflow.upload(&request).await?)?;
        }
        Command::Download(args) => {
            emit(stdout.lock(), &workflow.download(&operand, &args.out).await?)?;
        }
        Command::Action {
            command: ActionCommand::Approve(args),
        } => {
            let result = workflow.approve(&operand, args.ica_address.as_deref()).await?;
            emit(stdout.lock(), &result)?;
        }
        Command::Action {
            command: ActionCommand::Status(_),
        } => {
            emit(stdout.lock(), &workflow.status(&operand).await?)?;
        }
    }
    Ok(())
}

/// Open the keyring and build the workflow over the production adapters.
fn connect(config: &Config, deadline: Deadline) -> Result<ActionWorkflow> {
    let keyring = KeyringProvider::new(LocalKeystore).open_for(config)?;

    let controller = TendermintClient::new(&config.controller.rpc_endpoint, RPC_REQUEST_TIMEOUT)?;
    let host = TendermintClient::new(&config.host.rpc_endpoint, RPC_REQUEST_TIMEOUT)?;
    debug!(
        controller = controller.url(),
        host = host.url(),
        connection = %config.controller.connection_id,
        "chain clients ready"
    );

    let transport =
        RpcIcaTransport::new(controller, host.clone(), keyring.clone(), &config.controller);
    let identity = ResolvedIdentity::resolve(&keyring, config)?;
    let coordinator =
        IcaCoordinator::new(Arc::new(transport), keyring, identity, &config.controller)?;

    let ledger = Arc::new(RpcHostLedger::new(host));
    let mut workflow = ActionWorkflow::new(coordinator, ledger, deadline)
        .with_fee_denom(config.host.fee_denom.clone());
    if config.mesh.endpoint.is_some() {
        workflow = workflow.with_mesh(Arc::new(HttpMesh::new(&config.mesh)?));
    }
    Ok(workflow)
}
