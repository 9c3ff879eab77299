//! `agentloom agents`: List configured agents.

use std::path::Path;

pub fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;

    if config.agents.is_empty() {
        println!("No agents configured.");
        println!("Add [[agents]] entries to your config file.");
        return Ok(());
    }

    println!("{:<20} {:<8} {:<6} {:<8} DESCRIPTION", "ID", "STRATEGY", "STEPS", "ACTIVE");
    for agent in &config.agents {
        let steps = agent
            .max_steps
            .map(|n| n.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{:<20} {:<8} {:<6} {:<8} {}",
            agent.id,
            agent.framework.as_str(),
            steps,
            if agent.is_active { "yes" } else { "no" },
            agent.description
        );
        if !agent.mcp_services.is_empty() {
            println!("{:<20} services: {}", "", agent.mcp_services.join(", "));
        }
    }

    Ok(())
}
