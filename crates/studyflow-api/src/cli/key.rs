//! CLI API key subcommands.

use anyhow::Result;
use clap::Subcommand;
use console::style;

use crate::http::extractors::auth::create_api_key;
use crate::state::AppState;

#[derive(Subcommand)]
pub enum KeyCommand {
    /// Create an API key for the acting user (`--user`).
    Create {
        /// Label for the key.
        #[arg(long, default_value = "default")]
        name: String,
    },
}

pub async fn handle_key_command(
    cmd: KeyCommand,
    state: &AppState,
    user_id: &str,
    json: bool,
) -> Result<()> {
    match cmd {
        KeyCommand::Create { name } => {
            let key = create_api_key(state, user_id, &name).await?;

            if json {
                let out = serde_json::json!({ "user_id": user_id, "name": name, "key": key });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!();
                println!(
                    "  {} API key for user '{}' (save this -- it won't be shown again):",
                    style("🔑").bold(),
                    style(user_id).cyan()
                );
                println!();
                println!("  {}", style(&key).yellow().bold());
                println!();
            }
            Ok(())
        }
    }
}
