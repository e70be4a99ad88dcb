//! `dropmate status`.

use dropmate_config_and_utils::Paths;
use dropmate_storage::{open_file_vault, TokenVault};

/// Print whether a session is persisted.
pub fn status(paths: &Paths) -> Result<(), Box<dyn std::error::Error>> {
    let vault = open_file_vault(paths.secure_store_file())?;
    println!("{}", describe(&vault)?);
    Ok(())
}

fn describe(vault: &TokenVault) -> Result<String, Box<dyn std::error::Error>> {
    let signed_in = vault.has_session_token()?;
    let provider = vault.get_provider_session()?;
    Ok(serde_json::json!({
        "logged_in": signed_in,
        "user_id": provider.as_ref().map(|p| p.uid.clone()),
        "email": provider.and_then(|p| p.email),
    })
    .to_string())
}
