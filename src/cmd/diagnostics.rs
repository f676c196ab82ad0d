use anyhow::{Context, Result};

use crate::broker::Broker;
use crate::config::Configuration;
use crate::store::Store;

pub async fn run(config_path: &str) -> Result<()> {
    let config = Configuration::load(config_path)?;

    println!("store: {}", config.store.path);
    let store = Store::open(&config.store.path).with_context(|| "opening store")?;
    store.init_tables().await?;
    println!("  OK");

    println!("broker: {}", config.broker.url);
    let broker = Broker::new(&config.broker.url);
    if broker.is_connected().await {
        println!("  OK");
    } else {
        println!("  UNREACHABLE");
    }

    println!("docker registry: {}", config.registry.url);
    println!("agent transport: {:?}", config.agent.transport);

    Ok(())
}
