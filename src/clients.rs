use std::{sync::OnceLock, time::Duration};

use color_eyre::eyre::{eyre, Result};

pub static REQWEST: OnceLock<reqwest::Client> = OnceLock::new();

/// Outbound HTTP client shared by the Cloudinary and JWKS calls
pub fn get_reqwest_client() -> Result<&'static reqwest::Client> {
    REQWEST.get().ok_or(eyre!("Failed to get reqwest client"))
}

pub fn init_reqwest_client() -> Result<&'static reqwest::Client> {
    if let Some(client) = REQWEST.get() {
        return Ok(client);
    }
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()?;
    // A concurrent initialiser may have won the race; either client is fine.
    let _ = REQWEST.set(client);
    get_reqwest_client()
}
