//! `medflow server` — Start the MedFlow HTTP backend server.

pub async fn run(host: String, port: u16, static_dir: Option<String>) -> Result<(), String> {
    super::load_dotenv();

    let config = medflow_server::ServerConfig {
        host: host.clone(),
        port,
        static_dir,
    };

    println!("Starting MedFlow server on {}:{}...", host, port);

    let addr = medflow_server::start_server(config).await?;
    println!("MedFlow server listening on http://{}", addr);

    // Keep the process running until interrupted
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| format!("Failed to listen for Ctrl+C: {}", e))?;

    println!("\nShutting down...");
    Ok(())
}
