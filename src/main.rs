use anyhow::Result;
use log::info;

use ftsensor_rs::cli::{build_cli, handle_subcommands};
use ftsensor_rs::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    let default_filter = if matches.get_flag("verbose") { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    info!("🖥️  Force/Torque sensor driver v{}", ftsensor_rs::VERSION);

    let config = Config::from_matches(&matches)?;
    config.validate()?;

    handle_subcommands(&matches, &config).await
}
