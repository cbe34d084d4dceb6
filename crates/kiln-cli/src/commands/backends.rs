//! Backends listing command

use anyhow::{anyhow, Result};
use kiln_gen::{available_backends, KilnConfig};

pub fn run() -> Result<()> {
    let config = KilnConfig::load().map_err(|e| anyhow!("{}", e))?;
    let default = config.default_backend().to_string();

    for name in available_backends() {
        let mut notes = Vec::new();
        if name == default {
            notes.push("default");
        }
        if !config.is_enabled(name) {
            notes.push("disabled");
        }
        if config.token(name).is_some() {
            notes.push("token set");
        }
        if notes.is_empty() {
            println!("{}", name);
        } else {
            println!("{} ({})", name, notes.join(", "));
        }
    }

    Ok(())
}
