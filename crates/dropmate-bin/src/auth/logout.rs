//! `dropmate logout`.

use dropmate_config_and_utils::Paths;
use dropmate_storage::{open_file_vault, TokenVault};
use tracing::info;

/// Clear the persisted session token and provider credential.
pub fn logout(paths: &Paths) -> Result<(), Box<dyn std::error::Error>> {
    let vault = open_file_vault(paths.secure_store_file())?;
    if clear(&vault)? {
        println!("Logged out");
    } else {
        println!("No session to clear");
    }
    Ok(())
}

/// Returns whether anything was stored.
fn clear(vault: &TokenVault) -> Result<bool, Box<dyn std::error::Error>> {
    let had_token = vault.clear_session_token()?;
    let had_provider = vault.clear_provider_session()?;
    info!(had_token, had_provider, "Cleared persisted session");
    Ok(had_token || had_provider)
}
