//! `agentloom tools`: List built-in tools.

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let registry = agentloom_tools::global();
    let tools = registry.available();

    println!("Built-in tools ({})", tools.len());
    println!();
    for tool in &tools {
        println!("  {:<16} {}", tool.name, tool.description);
    }
    println!();
    println!("  Remote tools are discovered per agent from its MCP services");
    println!("  and addressed as <service>@<tool>.");

    Ok(())
}
