//! Manual smoke-test harness for `desecq-core`. Not the in-scope GUI;
//! this drives the façade from a terminal so the core can be exercised
//! against a live (or mocked) service without a UI shell.

use std::path::PathBuf;

use desecq_core::facade::Facade;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let root = std::env::var("DESECQ_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_root());
    let password = std::env::var("DESECQ_PASSWORD").unwrap_or_default();

    let facade = Facade::open(root, &password).await?;
    tracing::info!(profile = %facade.active_profile(), "opened profile");

    let mut signals = facade.subscribe();
    tokio::spawn(async move {
        while let Ok(signal) = signals.recv().await {
            tracing::info!(?signal, "signal");
        }
    });

    match std::env::args().nth(1).as_deref() {
        Some("zones") => {
            let zones = facade.zones().await;
            for zone in zones {
                println!("{}", zone.name);
            }
        }
        Some("records") => {
            let domain = std::env::args().nth(2).ok_or("usage: desecq-cli records <domain>")?;
            let records = facade.records(&domain).await;
            for record in records {
                println!("{} {} {} {:?}", record.subname, record.record_type, record.ttl, record.records);
            }
        }
        Some("account") => {
            match facade.account().await {
                Some(info) => println!("limit_domains={}", info.limit_domains),
                None => println!("account info unavailable"),
            }
        }
        _ => {
            eprintln!("usage: desecq-cli <zones|records <domain>|account>");
        }
    }

    facade.close()?;
    Ok(())
}

fn default_root() -> PathBuf {
    directories::ProjectDirs::from("io", "desecq", "desecq")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".desecq"))
}
