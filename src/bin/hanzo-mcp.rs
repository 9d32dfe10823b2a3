//! `hanzo-mcp` — CLI entry point.
//!
//! Usage:
//!   hanzo-mcp serve --allow <path> [--allow <path> ...]   # default command
//!   hanzo-mcp list-tools --allow <path>
//!   hanzo-mcp install-desktop

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hanzo_mcp::config::ServerConfig;
use hanzo_mcp::context::ServerContext;
use hanzo_mcp::tools;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hanzo-mcp")]
#[command(about = "MCP tool server exposing file, search, shell, and process tools over stdio JSON-RPC")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the stdio JSON-RPC transport (the default when no subcommand is given).
    Serve(SharedArgs),
    /// Enumerate enabled tools and exit, without starting the transport.
    ListTools(SharedArgs),
    /// Write a configuration file registering this server at the host's
    /// well-known desktop-config location.
    ///
    /// Desktop host configuration installation is an external collaborator
    /// concern outside this server's core; this subcommand is a stub that
    /// reports where such a writer would need to look, rather than
    /// performing it.
    InstallDesktop,
}

#[derive(Parser)]
struct SharedArgs {
    /// Directory this server is permitted to read, write, and search under.
    /// May be given more than once. Falls back to `HANZO_ALLOWED_PATHS`
    /// (comma-separated), then to the current directory.
    #[arg(long = "allow", value_name = "PATH")]
    allowed_roots: Vec<PathBuf>,

    /// Display name reported in `initialize`'s `serverInfo.name`.
    #[arg(long)]
    name: Option<String>,

    /// Disable write/edit/multi_edit tools (read-only server).
    #[arg(long)]
    disable_writes: bool,

    /// Disable grep/find/search tools.
    #[arg(long)]
    disable_search: bool,

    /// Register the optional agent delegator tool.
    #[arg(long)]
    enable_agent: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve(SharedArgs {
        allowed_roots: Vec::new(),
        name: None,
        disable_writes: false,
        disable_search: false,
        enable_agent: false,
    })) {
        Commands::Serve(args) => serve(args),
        Commands::ListTools(args) => list_tools(args),
        Commands::InstallDesktop => {
            eprintln!("install-desktop is not implemented by this core server; a desktop host's");
            eprintln!("own launcher is responsible for registering hanzo-mcp at its well-known");
            eprintln!("configuration location.");
            Ok(())
        }
    }
}

fn build_config(args: SharedArgs) -> anyhow::Result<ServerConfig> {
    ServerConfig::build(args.allowed_roots, args.name, args.disable_writes, args.disable_search, args.enable_agent)
}

fn serve(args: SharedArgs) -> anyhow::Result<()> {
    let config = build_config(args)?;
    let ctx = ServerContext::new(config);
    tools::register_all(&ctx);

    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(hanzo_mcp::transport::run(ctx))
}

fn list_tools(args: SharedArgs) -> anyhow::Result<()> {
    let config = build_config(args)?;
    let ctx = ServerContext::new(config);
    tools::register_all(&ctx);

    for definition in tools::list_tools(&ctx) {
        println!("{}\t{}", definition.name, definition.description);
    }
    let prompt_resource = tools::prompt::documentation_entry();
    println!("{}\t{}", prompt_resource.name, prompt_resource.description);
    Ok(())
}
