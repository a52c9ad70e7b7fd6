use actix_web::{web, App, HttpServer};
use chatrelay::cli::{commands::{Cli, Commands}, run_cli};
use chatrelay::config::AppConfig;
use chatrelay::llm::ProviderFactory;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if !matches!(cli.command, Commands::Serve) {
        if let Err(e) = run_cli(cli.command, cli.config).await {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        return Ok(());
    }

    info!("Starting chatrelay server...");

    let config = match AppConfig::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let provider = ProviderFactory::create_default(&config);
    info!(
        provider = provider.name(),
        model = provider.default_model(),
        "LLM provider ready"
    );

    let host = config.server.host.clone();
    let port = config.server.port;

    info!("Server listening on {}:{}", host, port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(provider.clone()))
            .configure(chatrelay::api::routes::configure)
    })
    .bind((host, port))?
    .run()
    .await
}
