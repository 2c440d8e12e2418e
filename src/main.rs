use threadline::config::{AppConfig, load_dotenv};
use threadline::session::AppContext;
use tracing::{error, info};

fn main() {
    tracing_subscriber::fmt::init();

    if load_dotenv() {
        info!("loaded .env");
    }

    let ctx = match AppConfig::from_env()
        .map_err(anyhow::Error::from)
        .and_then(|config| AppContext::from_config(&config))
    {
        Ok(ctx) => ctx,
        Err(err) => {
            error!(error = %format!("{err:#}"), "failed to start threadline");
            std::process::exit(1);
        }
    };

    dioxus::LaunchBuilder::new()
        .with_context(ctx)
        .launch(threadline::ui::App);
}
