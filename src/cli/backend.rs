use anyhow::Result;

#[derive(Debug, Clone, clap::Subcommand)]
pub enum BackendCommands {
    /// Start the registry HTTP server
    Serve,
    /// Check configuration for errors and unused options
    CheckConfig,
}

pub async fn handle_backend_command(cmd: BackendCommands) -> Result<()> {
    match cmd {
        BackendCommands::Serve => {
            let settings = crate::server::settings::Settings::new()?;
            crate::server::run_server(settings).await
        }
        BackendCommands::CheckConfig => {
            println!("Checking configuration...");
            match crate::server::settings::Settings::new() {
                Ok(settings) => {
                    println!("✓ Configuration is valid");
                    println!(
                        "  listen: {}:{}",
                        settings.server.host, settings.server.port
                    );
                    println!(
                        "  local registry: {}",
                        if settings.registry.local_hostname.is_empty() {
                            "<unset>"
                        } else {
                            &settings.registry.local_hostname
                        }
                    );
                    println!("  pull-through: {}", settings.registry.pullthrough);
                    Ok(())
                }
                Err(e) => {
                    eprintln!("✗ Configuration error: {}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}
