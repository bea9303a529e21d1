use anyhow::Result;

use crate::server::roles::RoleTable;
use crate::server::settings::Settings;

#[derive(Debug, Clone, clap::Subcommand)]
pub enum BackendCommands {
    /// Start the HTTP server (default)
    Serve,
    /// Check configuration and print the resolved role table
    CheckConfig,
}

pub async fn handle_backend_command(cmd: BackendCommands) -> Result<()> {
    match cmd {
        BackendCommands::Serve => {
            let settings = Settings::new()?;
            crate::server::run_server(settings).await
        }
        BackendCommands::CheckConfig => {
            println!("Checking configuration...");
            match check_config() {
                Ok(roles) => {
                    println!("✓ Configuration is valid");
                    for (role, entry) in roles.roles() {
                        println!(
                            "  {} -> {}/{}",
                            role, entry.namespace, entry.service_account
                        );
                    }
                    Ok(())
                }
                Err(e) => {
                    eprintln!("✗ Configuration error: {:#}", e);
                    std::process::exit(1);
                }
            }
        }
    }
}

fn check_config() -> Result<RoleTable> {
    let settings = Settings::new()?;
    Ok(RoleTable::from_settings(&settings.roles)?)
}
