use anyhow::{Context, Result};

use kiln_core::config::KilnConfig;
use kiln_core::logging::{init_logging, LoggingConfig};
use kiln_core::server::HttpServer;

use crate::Cli;

/// Values from the command line that were not usable as given
#[derive(Debug, Default, PartialEq, Eq)]
struct Ignored {
    port: Option<String>,
    threads: Option<String>,
}

/// Load configuration, apply command-line overrides, then serve until killed.
pub fn run(cli: Cli) -> Result<()> {
    let mut config = KilnConfig::load_from(&cli.config)?;
    let ignored = apply_overrides(&mut config, &cli);
    config.validate().context("Invalid configuration")?;

    init_logging(&LoggingConfig::from_settings(&config.logging)?)?;

    if let Some(port) = &ignored.port {
        log::warn!("Invalid port '{}', using {}", port, config.server.port);
    }
    if let Some(threads) = &ignored.threads {
        log::warn!("Invalid thread count '{}', using {}", threads, config.server.pool_size);
    }

    let server = HttpServer::bind(config.server)?;
    print_banner(&server);
    server.run()?;
    Ok(())
}

/// Apply command-line values over the loaded configuration
///
/// Non-numeric port or thread values leave the configured value in place and
/// are reported back so they can be logged once logging is up.
fn apply_overrides(config: &mut KilnConfig, cli: &Cli) -> Ignored {
    let mut ignored = Ignored::default();
    let server = &mut config.server;

    if let Some(raw) = &cli.port {
        match raw.trim().parse::<u16>() {
            Ok(port) if port != 0 => server.port = port,
            _ => ignored.port = Some(raw.clone()),
        }
    }
    if let Some(host) = &cli.host {
        server.host = host.clone();
    }
    if let Some(raw) = &cli.threads {
        match raw.trim().parse::<usize>() {
            Ok(threads) => server.set_pool_size(threads),
            Err(_) => ignored.threads = Some(raw.clone()),
        }
    }
    if let Some(dir) = &cli.resource_dir {
        server.resource_dir = dir.clone();
    }
    if let Some(format) = &cli.log_format {
        config.logging.format = format.clone();
    }
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }

    ignored
}

fn print_banner(server: &HttpServer) {
    let config = server.config();
    println!("kiln v{}", env!("CARGO_PKG_VERSION"));
    println!("  Listening on   http://{}", server.local_addr());
    println!("  Worker threads {}", config.pool_size);
    println!("  Queue capacity {}", config.queue_capacity());
    println!("  Serving        {}", config.resource_dir.display());
    println!("  Uploads        {}", config.upload_dir().display());
    println!();
}
