use anyhow::Result;
use switchboard_core::config::AppConfig;

pub fn run(config: &AppConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&config.redacted_summary())?);
    Ok(())
}
