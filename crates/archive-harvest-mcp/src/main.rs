use std::sync::Arc;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use serde_json::json;

use archive_harvest_mcp::config::load_config;
use archive_harvest_mcp::context::HarvestContext;
use archive_harvest_mcp::protocol::ProtocolHandler;
use archive_harvest_mcp::tools::ToolRegistry;
use archive_harvest_mcp::transport::StdioTransport;
use archive_harvest_mcp::types::{InitializeResult, ToolCallResult, ToolContent};

#[derive(Parser)]
#[command(
    name = "archive-harvest-mcp",
    about = "MCP server for searching the national archives and harvesting item images",
    version
)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server over stdio (default).
    Serve,

    /// Print server capabilities and tool names as JSON.
    Info,

    /// Run one crawl and print the result.
    Crawl {
        /// Item page URL.
        url: String,

        /// Directory to save files into.
        #[arg(short, long)]
        download_path: Option<String>,

        /// Show the browser window.
        #[arg(long)]
        headed: bool,

        /// Only list files, do not download.
        #[arg(long)]
        no_download: bool,

        /// Pin a backend (primary, alternate).
        #[arg(long)]
        backend: Option<String>,
    },

    /// Run one catalogue search and print the result.
    Search {
        term: String,

        #[arg(long, default_value = "0")]
        category: String,

        #[arg(long, default_value = "1")]
        page_no: String,

        #[arg(long, default_value = "100")]
        rows: String,
    },

    /// Generate shell completion scripts.
    ///
    /// Example:
    ///   archive-harvest-mcp completions zsh > ~/.zfunc/_archive-harvest-mcp
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let context = Arc::new(HarvestContext::new(load_config(cli.config.as_deref())?));
            tracing::info!(
                domain = %context.config().portal.domain,
                "archive-harvest MCP server starting"
            );
            let transport = StdioTransport::new(ProtocolHandler::new(context));
            transport.run().await?;
        }

        Commands::Info => {
            let init = InitializeResult::default_result();
            let tools = ToolRegistry::list_tools();
            let info = json!({
                "server": init.server_info,
                "protocol_version": init.protocol_version,
                "capabilities": init.capabilities,
                "tools": tools.iter().map(|t| &t.name).collect::<Vec<_>>(),
                "tool_count": tools.len(),
            });
            println!("{}", serde_json::to_string_pretty(&info)?);
        }

        Commands::Crawl {
            url,
            download_path,
            headed,
            no_download,
            backend,
        } => {
            let context = HarvestContext::new(load_config(cli.config.as_deref())?);
            let mut args = json!({ "pageUrl": url, "autoDownload": !no_download });
            if let Some(path) = download_path {
                args["downloadPath"] = json!(path);
            }
            if headed {
                args["useHeadless"] = json!(false);
            }
            if let Some(backend) = backend {
                args["backend"] = json!(backend);
            }
            let result = ToolRegistry::call("crawl", Some(args), &context).await?;
            print_result(&result);
        }

        Commands::Search {
            term,
            category,
            page_no,
            rows,
        } => {
            let context = HarvestContext::new(load_config(cli.config.as_deref())?);
            let args = json!({
                "searchValue": term,
                "category": category,
                "pageNo": page_no,
                "numOfRows": rows,
            });
            let result = ToolRegistry::call("search", Some(args), &context).await?;
            print_result(&result);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "archive-harvest-mcp", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn print_result(result: &ToolCallResult) {
    for content in &result.content {
        match content {
            ToolContent::Text { text } => println!("{text}"),
        }
    }
}
