//! `medflow agent` / `medflow tool` — Inspect agent profiles and tools.

use medflow_core::state::AppState;

use super::truncate;

/// List the agent profiles the workflows resolve against.
pub async fn list(state: &AppState) -> Result<(), String> {
    let profiles = state.toolbox.profiles().all();

    println!("┌──────────────────┬──────────────────────┬──────────────┬────────────────────┐");
    println!("│ ID               │ Name                 │ Model        │ Tools              │");
    println!("├──────────────────┼──────────────────────┼──────────────┼────────────────────┤");
    for profile in &profiles {
        println!(
            "│ {:<16} │ {:<20} │ {:<12} │ {:<18} │",
            truncate(&profile.id, 16),
            truncate(&profile.name, 20),
            truncate(profile.model.as_deref().unwrap_or(&state.config.agent.model), 12),
            truncate(&profile.tools.join(","), 18),
        );
    }
    println!("└──────────────────┴──────────────────────┴──────────────┴────────────────────┘");
    println!("{} profile(s), adapter: {}", profiles.len(), state.config.agent.adapter.as_str());
    Ok(())
}

/// List the registered tools.
pub async fn list_tools(state: &AppState) -> Result<(), String> {
    for tool in state.toolbox.tools().list() {
        println!("{:<20} {}", tool.id, tool.description);
    }
    Ok(())
}
