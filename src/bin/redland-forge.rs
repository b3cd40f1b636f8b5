//! CLI entry point: parse arguments, run the controller, exit with its
//! status code.

use redland_forge::config::AppConfig;
use redland_forge::tui::app::ApplicationController;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match AppConfig::from_args(std::env::args_os()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("redland-forge: {err}");
            std::process::exit(2);
        }
    };

    init_logging(config.debug);

    let controller = ApplicationController::new(config)?;
    let exit_code = match controller.run().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("redland-forge: {err}");
            1
        }
    };

    std::process::exit(exit_code);
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}
