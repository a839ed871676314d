use std::{net::SocketAddr, path::Path, sync::Arc};

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use incident_relay::{
    adapters::{HyperUpstreamClient, IncidentHandler, build_router},
    config::{ServerConfig, ServerConfigValidator, loader::load_config_sync},
    core::{EndpointResolver, EndpointSources},
    ports::http_client::UpstreamClient,
    submission::{IncidentSubmission, Severity, SubmitTarget, submit_incident},
    tracing_setup,
    utils::graceful_shutdown::GracefulShutdown,
};

const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Configuration file (defaults and environment only when omitted and
    /// ./config.toml does not exist)
    #[clap(short, long)]
    config: Option<String>,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long)]
        config: Option<String>,
    },
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,
    },
    /// Submit an incident run and print the reply
    Submit {
        /// Service the incident concerns
        #[clap(long)]
        service: String,
        /// low, medium, high or critical
        #[clap(long, default_value = "medium")]
        severity: String,
        /// Short description of what is happening
        #[clap(long)]
        summary: String,
        /// Comma separated signals, e.g. "5xx spike, p99 latency"
        #[clap(long, default_value = "")]
        signals: String,
        /// Most recent deploy SHA, if known
        #[clap(long)]
        sha: Option<String>,
        /// Backend base URL; bypasses origin-based selection
        #[clap(long, env = "INCIDENT_API_BASE")]
        api_base: Option<String>,
        /// Origin the submission is made from
        #[clap(long, default_value = "http://localhost:3000")]
        origin: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    match args.command {
        Some(Commands::Validate { config }) => validate_config_command(&config),
        Some(Commands::Init { config }) => init_config_command(&config).await,
        Some(Commands::Submit {
            service,
            severity,
            summary,
            signals,
            sha,
            api_base,
            origin,
        }) => {
            tracing_setup::init_console_tracing()?;
            let severity: Severity = severity.parse()?;
            let submission =
                IncidentSubmission::from_form(&service, severity, &summary, &signals, sha.as_deref());
            submit_command(&submission, api_base.as_deref(), &origin).await
        }
        Some(Commands::Serve { config }) => serve(config.or(args.config)).await,
        None => serve(args.config).await,
    }
}

/// An explicit path must exist; otherwise fall back to ./config.toml when present.
fn config_source(explicit: Option<String>) -> Option<String> {
    explicit.or_else(|| {
        Path::new(DEFAULT_CONFIG_PATH)
            .exists()
            .then(|| DEFAULT_CONFIG_PATH.to_string())
    })
}

async fn serve(config_path: Option<String>) -> Result<()> {
    let config_path = config_source(config_path);
    let config: ServerConfig = load_config_sync(config_path.as_deref()).with_context(|| {
        format!(
            "Failed to load configuration from {}",
            config_path.as_deref().unwrap_or("<environment>")
        )
    })?;
    ServerConfigValidator::validate(&config).map_err(|e| eyre!("Invalid configuration: {e}"))?;

    tracing_setup::init_from_config(&config.logging)
        .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;

    match &config_path {
        Some(path) => tracing::info!("Loaded configuration from {path}"),
        None => tracing::info!("No configuration file, using defaults and environment"),
    }

    let resolver = EndpointResolver::new(EndpointSources::from_env(&config.backend.source_vars));
    let upstream: Arc<dyn UpstreamClient> =
        Arc::new(HyperUpstreamClient::new().context("Failed to create upstream client")?);
    let handler = Arc::new(IncidentHandler::new(resolver, upstream, &config));

    let resolver = handler.resolver();
    match (resolver.resolved_source(), resolver.target_url()) {
        (Some(source), Some(target)) => {
            tracing::info!(source, upstream = %target, "Backend resolved");
        }
        _ => {
            tracing::warn!(
                "No backend configured; submissions will be answered with 503. {}",
                resolver.setup_guidance()
            );
        }
    }
    let timeout = handler.timeout();
    let app = build_router(handler);

    let graceful_shutdown = GracefulShutdown::new();
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    tracing::info!(
        "Incident relay listening on {} (timeout {} ms)",
        addr,
        timeout.as_millis()
    );

    let shutdown = graceful_shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let reason = shutdown.wait_for_shutdown_signal().await;
            tracing::info!("Stopping server: {:?}", reason);
        })
        .await
        .context("Server error")?;

    tracing::info!("Server shut down cleanly");
    Ok(())
}

async fn submit_command(
    submission: &IncidentSubmission,
    api_base: Option<&str>,
    origin: &str,
) -> Result<()> {
    let target = SubmitTarget::resolve(api_base, origin)?;
    let client = reqwest::Client::builder()
        .user_agent(concat!("incident-relay/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;

    println!("Submitting incident for '{}' to {}", submission.service, target.url());
    let reply = submit_incident(&client, target.url(), submission).await?;

    println!("Status: {}", reply.status);
    println!("{}", reply.pretty_body());
    Ok(())
}

/// Validate a configuration file
fn validate_config_command(config_path: &str) -> Result<()> {
    println!("🔍 Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config_sync(Some(config_path)) {
        Ok(config) => {
            println!("✅ Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("❌ Configuration parsing failed:");
            eprintln!("   {e:#}");
            std::process::exit(1);
        }
    };

    match ServerConfigValidator::validate(&config) {
        Ok(()) => {
            let resolver =
                EndpointResolver::new(EndpointSources::from_env(&config.backend.source_vars));
            println!("✅ Configuration validation: OK");
            println!();
            println!("📋 Configuration Summary:");
            println!("   • Listen Address: {}", config.listen_addr);
            println!("   • Backend Sources: {}", config.backend.source_vars.join(", "));
            println!(
                "   • Resolved Backend: {}",
                resolver.target_url().as_deref().unwrap_or("(not configured)")
            );
            println!("   • Timeout: {} ms", config.backend.timeout_ms);
            println!("   • Max Body: {} bytes", config.server.max_body_bytes);
            println!();
            println!("🎉 Configuration is valid and ready to use!");
            Ok(())
        }
        Err(e) => {
            eprintln!("❌ Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("💡 Common fixes:");
            println!("   • Verify listen address format (e.g., '127.0.0.1:8080')");
            println!("   • Ensure timeout_ms and max_body_bytes are greater than zero");
            println!("   • List at least one environment variable in backend.source_vars");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("❌ Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Incident Relay Configuration

# The address to listen on
listen_addr = "127.0.0.1:8080"

[server]
# Largest accepted submission body, in bytes
max_body_bytes = 16777216

[backend]
# Environment variables consulted for the backend base URL, first non-empty wins
source_vars = ["INCIDENT_BACKEND_URL", "AGENTS_API_URL", "BACKEND_URL"]
# Deadline for the outbound request, in milliseconds
timeout_ms = 15000

[logging]
level = "info"
# "json" or "pretty"
format = "json"
include_spans = true
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("✅ Created default configuration at: {config_path}");
    println!("   Run 'incident-relay serve --config {config_path}' to start the server");
    Ok(())
}
