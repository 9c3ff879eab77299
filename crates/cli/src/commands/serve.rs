//! `agentloom serve`: Start the HTTP gateway.

use std::path::Path;

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }
    config.require_credentials()?;

    println!("agentloom gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Agents:    {}", config.agents.len());

    agentloom_gateway::start(config).await?;

    Ok(())
}
