use clap::Parser;
use tower_lsp::{LspService, Server};
use tracing::info;

use angelscript_language_server::config::ServerConfig;
use angelscript_language_server::logging::init_logger;
use angelscript_language_server::lsp::{AngelscriptBackend, GET_TYPE_HIERARCHY, GET_TYPE_MEMBERS, SEARCH_SYMBOLS};

#[derive(Parser, Debug)]
#[command(name = "angelscript-language-server")]
#[command(author, version, about = "Language server for Unreal Engine Angelscript", long_about = None)]
struct Args {
    /// Disable ANSI colors in stderr logs
    #[arg(long)]
    no_color: bool,

    /// Stderr log level or filter (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Do not write a session log file
    #[arg(long)]
    no_file_logging: bool,

    /// Host of the engine's debug server
    #[arg(long)]
    engine_host: Option<String>,

    /// Port of the engine's debug server
    #[arg(long)]
    engine_port: Option<u16>,

    /// Never connect to the engine; serve only the snapshot and scripts
    #[arg(long)]
    no_engine: bool,

    /// Communicate over stdio (the only transport; accepted for client compatibility)
    #[arg(long)]
    stdio: bool,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        let mut config = ServerConfig::default();
        if let Some(host) = &self.engine_host {
            config.engine.host = host.clone();
        }
        if let Some(port) = self.engine_port {
            config.engine.port = port;
        }
        if self.no_engine {
            config.engine.enabled = false;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = init_logger(args.no_color, args.log_level.as_deref(), !args.no_file_logging)?;
    info!("Starting {} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = args.server_config();
    let (service, socket) = LspService::build(|client| AngelscriptBackend::new(client, config.clone()))
        .custom_method(GET_TYPE_HIERARCHY, AngelscriptBackend::get_type_hierarchy)
        .custom_method(GET_TYPE_MEMBERS, AngelscriptBackend::get_type_members)
        .custom_method(SEARCH_SYMBOLS, AngelscriptBackend::search_symbols)
        .finish();

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    Server::new(stdin, stdout, socket).serve(service).await;

    info!("Language server exited");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_engine_endpoint() {
        let args = Args::parse_from(["angelscript-language-server", "--engine-port", "28000", "--no-engine"]);
        let config = args.server_config();
        assert_eq!(config.engine.port, 28000);
        assert!(!config.engine.enabled);
        assert_eq!(config.engine.host, "127.0.0.1");
    }
}
