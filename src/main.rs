use clap::{Parser, ValueEnum};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use clusterm::api::{
    CancelResponse, DiscoverRequest, ErrorResponse, GlobalsRequest, NodesRequest,
};
use clusterm::config::{Config, ServerConfig};
use clusterm::configuration::{
    is_valid_host_group, AnsibleConfiguration, MASTER_GROUP_NAME, WORKER_GROUP_NAME,
};
use clusterm::inventory::MemInventory;
use clusterm::manager::validate::{
    validate_extra_vars, validate_multi_node_addrs, validate_multi_node_names, validate_one_arg,
    validate_zero_args,
};
use clusterm::manager::Manager;
use clusterm::node::Node;
use clusterm::scheduler::JobInfo;
use clusterm::shutdown::{drain_active_job, install_shutdown_handler};

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Parser, Debug)]
#[command(name = "clusterm")]
#[command(version)]
#[command(about = "Cluster node lifecycle manager")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the cluster manager
    Server(ServerArgs),

    /// Single node commands
    Node {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: NodeCommands,
    },

    /// Multi node commands
    Nodes {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: NodesCommands,
    },

    /// Global extra vars
    Global {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: GlobalCommands,
    },

    /// Manager configuration
    Config {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Job commands
    Job {
        #[command(flatten)]
        client: ClientArgs,

        #[command(subcommand)]
        command: JobCommands,
    },
}

// =============================================================================
// Server Arguments
// =============================================================================

#[derive(Parser, Debug)]
struct ServerArgs {
    /// Address to serve the HTTP API on
    #[arg(long, default_value = "127.0.0.1:9007")]
    listen: SocketAddr,

    /// Path to a JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seconds to wait for the active job after a shutdown signal
    #[arg(long, default_value = "30")]
    shutdown_grace_secs: u64,
}

// =============================================================================
// Client Arguments (shared by every client command)
// =============================================================================

#[derive(Parser, Debug)]
struct ClientArgs {
    /// Manager address
    #[arg(long, short = 'a', default_value = "http://127.0.0.1:9007")]
    addr: String,

    /// Output format
    #[arg(long, short = 'o', default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(clap::Args, Debug)]
struct EventFlags {
    /// Extra vars for the workflow, as a JSON object
    #[arg(long, short = 'e', default_value = "")]
    extra_vars: String,

    /// Host group: service-master or service-worker
    #[arg(long, short = 'g', default_value = "")]
    host_group: String,
}

// =============================================================================
// Node Commands
// =============================================================================

#[derive(clap::Subcommand, Debug)]
enum NodeCommands {
    /// Commission a node
    Commission {
        name: Vec<String>,
        #[command(flatten)]
        flags: EventFlags,
    },
    /// Decommission a node
    Decommission {
        name: Vec<String>,
        #[command(flatten)]
        flags: EventFlags,
    },
    /// Update a commissioned node
    Update {
        name: Vec<String>,
        #[command(flatten)]
        flags: EventFlags,
    },
    /// Show a node
    Get { name: Vec<String> },
}

#[derive(clap::Subcommand, Debug)]
enum NodesCommands {
    /// Commission one or more nodes
    Commission {
        names: Vec<String>,
        #[command(flatten)]
        flags: EventFlags,
    },
    /// Decommission one or more nodes
    Decommission {
        names: Vec<String>,
        #[command(flatten)]
        flags: EventFlags,
    },
    /// Update one or more commissioned nodes
    Update {
        names: Vec<String>,
        #[command(flatten)]
        flags: EventFlags,
    },
    /// Run discovery on one or more IP addresses
    Discover {
        addrs: Vec<String>,
        #[command(flatten)]
        flags: EventFlags,
    },
    /// List all nodes
    Get { args: Vec<String> },
}

#[derive(clap::Subcommand, Debug)]
enum GlobalCommands {
    /// Replace the global extra vars
    Set {
        args: Vec<String>,
        #[arg(long, short = 'e', default_value = "")]
        extra_vars: String,
    },
    /// Show the global extra vars
    Get { args: Vec<String> },
}

#[derive(clap::Subcommand, Debug)]
enum ConfigCommands {
    /// Replace the manager configuration from FILE, or stdin with "-"
    Set { file: Vec<String> },
}

#[derive(clap::Subcommand, Debug)]
enum JobCommands {
    /// Show the active or the last job
    Get { which: Vec<String> },
    /// Cancel the active job
    Cancel { args: Vec<String> },
}

// =============================================================================
// Server Implementation
// =============================================================================

async fn run_server(args: ServerArgs) -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = match &args.config {
        Some(path) => Config::read(std::fs::File::open(path)?)?,
        None => Config::default(),
    };
    let server = ServerConfig::new(args.listen).with_settings(settings);

    tracing::info!(
        listen_addr = %server.listen_addr,
        playbooks = %server.settings.ansible.playbook_location.display(),
        "Starting clusterm"
    );

    let inventory = Arc::new(MemInventory::new());
    let configuration = Arc::new(AnsibleConfiguration::new(
        server.settings.ansible.clone(),
    ));
    let manager = Arc::new(Manager::new(inventory, configuration, server.settings));
    manager.refresh_nodes().await;

    let shutdown = install_shutdown_handler();
    clusterm::api::run_api(server.listen_addr, manager.clone(), shutdown).await?;

    drain_active_job(manager, Duration::from_secs(args.shutdown_grace_secs)).await;
    tracing::info!("clusterm stopped");
    Ok(())
}

// =============================================================================
// HTTP Client
// =============================================================================

struct ApiClient {
    http: reqwest::Client,
    base: String,
}

impl ApiClient {
    fn new(args: &ClientArgs) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: args.addr.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base, path)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> CliResult<T> {
        let resp = self.http.get(self.url(path)).send().await?;
        Self::decode(resp).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> CliResult<T> {
        let resp = self.http.post(self.url(path)).json(body).send().await?;
        Self::decode(resp).await
    }

    async fn post_empty<B: Serialize>(&self, path: &str, body: &B) -> CliResult<()> {
        let resp = self.http.post(self.url(path)).json(body).send().await?;
        Self::check(resp).await.map(|_| ())
    }

    async fn check(resp: reqwest::Response) -> CliResult<reqwest::Response> {
        if resp.status().is_success() {
            return Ok(resp);
        }
        let status = resp.status();
        let msg = match resp.json::<ErrorResponse>().await {
            Ok(body) => body.error,
            Err(_) => status.to_string(),
        };
        Err(msg.into())
    }

    async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> CliResult<T> {
        Ok(Self::check(resp).await?.json::<T>().await?)
    }
}

// =============================================================================
// Output
// =============================================================================

fn print_json<T: Serialize>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_job(job: &JobInfo, output_format: &OutputFormat) -> CliResult<()> {
    match output_format {
        OutputFormat::Json => print_json(job)?,
        OutputFormat::Table => {
            println!("Job ID:      {}", job.id);
            println!("Description: {}", job.desc);
            println!("Status:      {}", job.status);
            if let Some(error) = &job.error {
                println!("Error:       {}", error);
            }
            if !job.logs.is_empty() {
                println!("Logs:");
                for line in &job.logs {
                    println!("  {}", line);
                }
            }
        }
    }
    Ok(())
}

fn print_nodes(nodes: &[Node], output_format: &OutputFormat) -> CliResult<()> {
    match output_format {
        OutputFormat::Json => print_json(&nodes)?,
        OutputFormat::Table => {
            if nodes.is_empty() {
                println!("No nodes found.");
                return Ok(());
            }
            println!(
                "{:<20} {:<16} {:<16} {:<16} STATE",
                "NAME", "ADDRESS", "GROUP", "STATUS"
            );
            println!("{}", "-".repeat(82));
            for node in nodes {
                let group = node
                    .cfg
                    .as_ref()
                    .map(|cfg| cfg.group.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let (status, state) = node
                    .inv
                    .map(|inv| (inv.status.to_string(), inv.state.to_string()))
                    .unwrap_or_else(|| ("-".to_string(), "-".to_string()));
                println!(
                    "{:<20} {:<16} {:<16} {:<16} {}",
                    node.name,
                    node.mgmt_addr.as_deref().unwrap_or("-"),
                    group,
                    status,
                    state
                );
            }
        }
    }
    Ok(())
}

// =============================================================================
// Client Command Handlers
// =============================================================================

fn validate_host_group(group: &str) -> CliResult<()> {
    if !is_valid_host_group(group) {
        return Err(format!(
            "invalid host group {group:?}, expected one of: {MASTER_GROUP_NAME}, {WORKER_GROUP_NAME}"
        )
        .into());
    }
    Ok(())
}

async fn handle_event(
    client: &ApiClient,
    path: &str,
    nodes: Vec<String>,
    flags: EventFlags,
    output_format: &OutputFormat,
) -> CliResult<()> {
    validate_extra_vars(&flags.extra_vars)?;
    let job: JobInfo = client
        .post(
            path,
            &NodesRequest {
                nodes,
                extra_vars: flags.extra_vars,
                host_group: flags.host_group,
            },
        )
        .await?;
    print_job(&job, output_format)
}

async fn handle_node(
    client: &ApiClient,
    command: NodeCommands,
    output_format: &OutputFormat,
) -> CliResult<()> {
    match command {
        NodeCommands::Commission { name, flags } => {
            validate_one_arg(&name)?;
            validate_host_group(&flags.host_group)?;
            handle_event(client, "nodes/commission", name, flags, output_format).await
        }
        NodeCommands::Decommission { name, flags } => {
            validate_one_arg(&name)?;
            handle_event(client, "nodes/decommission", name, flags, output_format).await
        }
        NodeCommands::Update { name, flags } => {
            validate_one_arg(&name)?;
            handle_event(client, "nodes/update", name, flags, output_format).await
        }
        NodeCommands::Get { name } => {
            validate_one_arg(&name)?;
            let node: Node = client.get(&format!("node/{}", name[0])).await?;
            print_nodes(&[node], output_format)
        }
    }
}

async fn handle_nodes(
    client: &ApiClient,
    command: NodesCommands,
    output_format: &OutputFormat,
) -> CliResult<()> {
    match command {
        NodesCommands::Commission { names, flags } => {
            validate_multi_node_names(&names)?;
            validate_host_group(&flags.host_group)?;
            handle_event(client, "nodes/commission", names, flags, output_format).await
        }
        NodesCommands::Decommission { names, flags } => {
            validate_multi_node_names(&names)?;
            handle_event(client, "nodes/decommission", names, flags, output_format).await
        }
        NodesCommands::Update { names, flags } => {
            validate_multi_node_names(&names)?;
            handle_event(client, "nodes/update", names, flags, output_format).await
        }
        NodesCommands::Discover { addrs, flags } => {
            validate_multi_node_addrs(&addrs)?;
            validate_extra_vars(&flags.extra_vars)?;
            let job: JobInfo = client
                .post(
                    "nodes/discover",
                    &DiscoverRequest {
                        addrs,
                        extra_vars: flags.extra_vars,
                    },
                )
                .await?;
            print_job(&job, output_format)
        }
        NodesCommands::Get { args } => {
            validate_zero_args(&args)?;
            let nodes: Vec<Node> = client.get("nodes").await?;
            print_nodes(&nodes, output_format)
        }
    }
}

async fn handle_global(
    client: &ApiClient,
    command: GlobalCommands,
    output_format: &OutputFormat,
) -> CliResult<()> {
    match command {
        GlobalCommands::Set { args, extra_vars } => {
            validate_zero_args(&args)?;
            validate_extra_vars(&extra_vars)?;
            client
                .post_empty("globals", &GlobalsRequest { extra_vars })
                .await?;
            println!("Global extra vars updated.");
            Ok(())
        }
        GlobalCommands::Get { args } => {
            validate_zero_args(&args)?;
            let globals: GlobalsRequest = client.get("globals").await?;
            match output_format {
                OutputFormat::Json => print_json(&globals),
                OutputFormat::Table => {
                    println!("Extra vars: {}", globals.extra_vars);
                    Ok(())
                }
            }
        }
    }
}

async fn handle_config(client: &ApiClient, command: ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Set { file } => {
            validate_one_arg(&file)?;
            let mut raw = Vec::new();
            if file[0] == "-" {
                std::io::stdin().read_to_end(&mut raw)?;
            } else {
                std::fs::File::open(&file[0])?.read_to_end(&mut raw)?;
            }
            // reject bad files before they reach the server
            let config = Config::read(raw.as_slice())?;
            client.post_empty("config", &config).await?;
            println!("Configuration applied.");
            Ok(())
        }
    }
}

async fn handle_job(
    client: &ApiClient,
    command: JobCommands,
    output_format: &OutputFormat,
) -> CliResult<()> {
    match command {
        JobCommands::Get { which } => {
            validate_one_arg(&which)?;
            let path = match which[0].as_str() {
                "active" => "jobs/active",
                "last" => "jobs/last",
                other => {
                    return Err(format!("unknown job {other:?}, expected: active or last").into())
                }
            };
            let job: JobInfo = client.get(path).await?;
            print_job(&job, output_format)
        }
        JobCommands::Cancel { args } => {
            validate_zero_args(&args)?;
            let resp: CancelResponse = client
                .post("jobs/active/cancel", &serde_json::json!({}))
                .await?;
            match output_format {
                OutputFormat::Json => print_json(&resp),
                OutputFormat::Table => {
                    println!("Cancellation requested for: {}", resp.cancelled);
                    Ok(())
                }
            }
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let result = match args.command {
        Commands::Server(server_args) => run_server(server_args).await,
        Commands::Node { client, command } => {
            handle_node(&ApiClient::new(&client), command, &client.output).await
        }
        Commands::Nodes { client, command } => {
            handle_nodes(&ApiClient::new(&client), command, &client.output).await
        }
        Commands::Global { client, command } => {
            handle_global(&ApiClient::new(&client), command, &client.output).await
        }
        Commands::Config { client, command } => {
            handle_config(&ApiClient::new(&client), command).await
        }
        Commands::Job { client, command } => {
            handle_job(&ApiClient::new(&client), command, &client.output).await
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
