//! OGC Tile Server - WMS and WMTS over raster tile sources.
//!
//! This binary starts the HTTP server and configures all components.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ogc_tile_server::{
    config::{CheckConfig, Cli, Command, ServeConfig},
    geometry::tile_bounds,
    layer::{LayerDefinition, LayerRegistry, LayersFile, SourceDefinition},
    server::{create_router, RouterConfig},
    service::OgcService,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Check(config) => run_check(config),
    }
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("OGC Tile Server v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!("  Layers file: {}", config.layers.display());
    info!("  Public URL: {}", config.public_url());
    info!(
        "  Limits: {} layers/map, {} px max area, {} concurrent fetches",
        config.max_layers, config.max_pixel_area, config.fetch_concurrency
    );
    info!(
        "  Cache: {}MB transcoded tiles, fetch timeout {}ms",
        config.cache_size / (1024 * 1024),
        config.fetch_timeout_ms
    );
    if config.dev_mode {
        warn!("  Dev mode: internal error messages are sent to clients");
    }

    let file = match LayersFile::load(&config.layers) {
        Ok(file) => file,
        Err(e) => {
            error!("Failed to load layers file: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let registry = match LayerRegistry::from_file(&file, config.fetch_timeout()).await {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!("Failed to build layers: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!(
        "  {} layer(s), {} visible",
        registry.len(),
        registry.visible().count()
    );

    let service = Arc::new(OgcService::new(registry, config.service_config()));

    let shutdown = CancellationToken::new();
    let router = create_router(service, build_router_config(&config, shutdown.clone()));

    let addr = config.bind_address();

    info!("");
    info!("────────────────────────────────────────────────────────────────");
    info!("  Server listening on: http://{}", addr);
    info!("");
    info!("  Try these endpoints:");
    info!("    curl http://{}/health", addr);
    info!("    curl http://{}/layers", addr);
    info!(
        "    curl 'http://{}/wmts?SERVICE=WMTS&REQUEST=GetCapabilities'",
        addr
    );
    info!(
        "    curl 'http://{}/wms?SERVICE=WMS&REQUEST=GetCapabilities'",
        addr
    );
    info!("────────────────────────────────────────────────────────────────");
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    let result = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await;

    if let Err(e) = result {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Server stopped");
    ExitCode::SUCCESS
}

/// Resolve on Ctrl-C and cancel every in-flight request.
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutting down");
    shutdown.cancel();
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "ogc_tile_server=debug,tower_http=debug"
    } else {
        "ogc_tile_server=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Build RouterConfig from the application ServeConfig.
fn build_router_config(config: &ServeConfig, shutdown: CancellationToken) -> RouterConfig {
    let mut router_config = RouterConfig::new()
        .with_cache_max_age(config.cache_max_age)
        .with_tracing(!config.no_tracing)
        .with_shutdown(shutdown);

    if let Some(ref origins) = config.cors_origins {
        router_config = router_config.with_cors_origins(origins.clone());
    }

    router_config
}

// =============================================================================
// Check Command
// =============================================================================

fn run_check(config: CheckConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    println!("OGC Tile Server Layers Check");
    println!("════════════════════════════");
    println!();

    let file = match LayersFile::load(&config.layers) {
        Ok(file) => {
            println!("✓ Layers file: {}", config.layers.display());
            file
        }
        Err(e) => {
            println!("✗ Layers file: {}", e);
            return ExitCode::FAILURE;
        }
    };

    println!("✓ Title: {}", file.title);
    println!();

    for def in &file.layers {
        print_layer(def);
    }

    println!("════════════════════════════");
    println!("✓ {} layer(s) valid", file.layers.len());

    ExitCode::SUCCESS
}

fn print_layer(def: &LayerDefinition) {
    let bbox = def.envelope();
    let range = def.zoom_range();

    println!(
        "  {} ({})",
        def.name,
        if def.viewable { "visible" } else { "hidden" }
    );
    match &def.source {
        SourceDefinition::Http { url } => println!("    Source: {}", url),
        SourceDefinition::S3 { bucket, prefix, .. } => {
            println!("    Source: s3://{}/{}", bucket, prefix)
        }
    }
    println!(
        "    Envelope: {:.4}, {:.4}, {:.4}, {:.4}",
        bbox.min_lon, bbox.min_lat, bbox.max_lon, bbox.max_lat
    );
    println!("    Zoom: {} to {}", range.min, range.max);
    for zoom in [range.min, range.max] {
        let bounds = tile_bounds(&bbox, zoom);
        println!(
            "    z{}: cols {}..={}, rows {}..={} ({} tiles)",
            zoom,
            bounds.min_col,
            bounds.max_col,
            bounds.min_row,
            bounds.max_row,
            bounds.tile_count()
        );
    }
    println!();
}
