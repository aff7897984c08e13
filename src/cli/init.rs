use tracing::info;

use super::InitArgs;
use crate::{
    config::{self, Config},
    errors::{AppError, Result},
};

pub fn execute(args: InitArgs) -> Result<()> {
    let path = config::config_path()?;
    if path.exists() && !args.force {
        return Err(AppError::ConfigExists(path.display().to_string()));
    }

    let path = config::save(&Config::default())?;
    info!(path = %path.display(), "config template written");
    println!("Config template saved at {}", path.display());
    println!("Fill in base_url and rossum_authorization_token,");
    println!("or export BASE_URL and ROSSUM_AUTHORIZATION_TOKEN.");
    Ok(())
}
