use chrono::Utc;
use clap::{Parser, Subcommand};
use radius_sync::{Config, Service, SubscriberStatus, db, http};
use std::process;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// RADIUS attribute sync and CoA session enforcement for ISP billing
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "radius-syncd")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "config.json")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service (post-auth hook, sessions, admin actions)
    Serve,
    /// Create the FreeRADIUS and billing tables if missing
    Migrate,
    /// List live sessions
    Online,
    /// Send Disconnect-Request for every live session of a user
    Disconnect { username: String },
    /// Change subscriber status, rewrite RADIUS rows and disconnect
    SetStatus {
        status: SubscriberStatus,
        #[arg(required = true)]
        ids: Vec<i64>,
    },
    /// Retry every subscriber and voucher whose rows drifted
    Resync,
    /// Expire overdue vouchers and cut their sessions
    ExpireVouchers,
    /// Validate configuration and exit
    Validate,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match Config::from_file(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            tracing_subscriber::registry()
                .with(EnvFilter::new("info"))
                .with(tracing_subscriber::fmt::layer())
                .init();

            if matches!(cli.command, Command::Validate) {
                eprintln!("Configuration validation failed: {}", e);
                process::exit(1);
            }

            warn!("Could not load config file from: {}", cli.config);
            info!("Creating example configuration at: {}", cli.config);

            if let Err(e) = Config::example().to_file(&cli.config) {
                error!("Error creating example config: {}", e);
                process::exit(1);
            }

            info!("Please edit {} and run again", cli.config);
            process::exit(0);
        }
    };

    if matches!(cli.command, Command::Validate) {
        println!("Configuration validated successfully");
        println!();
        println!("  Database: {}", db::mask_url(&config.database.url));
        println!("  HTTP listen: {}", config.http_listen);
        println!(
            "  CoA: port {}, timeout {}ms, {} retries, concurrency {}",
            config.coa.port, config.coa.timeout_ms, config.coa.retries, config.coa.max_concurrency
        );
        println!(
            "  Liveness: interim {}s, no-interim {}s",
            config.session.interim_window_secs, config.session.no_interim_window_secs
        );
        println!("  Isolation group: {}", config.attributes.isolation_group);
        println!("  NAS secret overrides: {}", config.nas_secrets.len());
        process::exit(0);
    }

    let log_level = config.log_level.as_deref().unwrap_or("info");
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("radius-syncd v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded configuration from: {}", cli.config);

    let (service, pool) = match Service::connect(&config).await {
        Ok(parts) => parts,
        Err(e) => {
            error!("Startup failed: {}", e);
            process::exit(1);
        }
    };

    let result: Result<(), Box<dyn std::error::Error>> = match cli.command {
        Command::Serve => match config.http_addr() {
            Ok(addr) => http::serve(service.app_state(), addr)
                .await
                .map_err(Into::into),
            Err(e) => Err(e.into()),
        },
        Command::Migrate => db::migrate(&pool)
            .await
            .map(|()| info!("Schema is up to date"))
            .map_err(Into::into),
        Command::Online => match service.observer.online_sessions(Utc::now()).await {
            Ok(summary) => {
                println!(
                    "{} online ({} pppoe, {} hotspot)",
                    summary.total, summary.pppoe, summary.hotspot
                );
                for s in &summary.sessions {
                    println!(
                        "  {:<20} {:<8} {:<15} {:>12}  up {:>10} down {:>10}",
                        s.username,
                        s.kind.as_str(),
                        s.framed_ip.map(|ip| ip.to_string()).unwrap_or_else(|| "-".to_string()),
                        s.duration,
                        s.upload,
                        s.download,
                    );
                }
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
        Command::Disconnect { username } => {
            let outcome = service
                .orchestrator
                .enforcer()
                .disconnect_user(&username)
                .await;
            if outcome.success {
                println!("{}", outcome.message.unwrap_or_default());
                Ok(())
            } else {
                Err(outcome.error.unwrap_or_default().into())
            }
        }
        Command::SetStatus { status, ids } => {
            match service.orchestrator.change_status(&ids, status).await {
                Ok(report) => {
                    println!(
                        "{} updated, {} synced, {} disconnected, {} CoA failures",
                        report.updated, report.synced, report.coa.disconnected, report.coa.failed
                    );
                    for username in &report.sync_failed {
                        println!("  sync failed: {}", username);
                    }
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
        Command::Resync => match service.sync.resync_drifted().await {
            Ok(report) => {
                println!(
                    "subscribers {} synced / {} failed, vouchers {} synced / {} failed",
                    report.subscribers_synced,
                    report.subscribers_failed,
                    report.vouchers_synced,
                    report.vouchers_failed
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        },
        Command::ExpireVouchers => {
            match service.orchestrator.expire_overdue_vouchers(Utc::now()).await {
                Ok(report) => {
                    println!(
                        "{} vouchers expired, {} sessions disconnected",
                        report.expired, report.coa.disconnected
                    );
                    for code in &report.purge_failed {
                        println!("  rows not removed, session kept: {}", code);
                    }
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
        Command::Validate => Ok(()),
    };

    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}
