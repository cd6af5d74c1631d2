mod app;
mod cli;

use clap::Parser;
use cli::Cli;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Peek at config for file-logging settings before the subscriber exists
    let peek = forum_core::config::Config::load(&cli.config).ok();
    let to_file = peek.as_ref().is_some_and(|c| c.logging_to_file);
    let log_dir = peek.and_then(|c| c.log_dir);
    let _guard =
        forum_core::lifecycle::logging::init_logging(&cli.log_level, to_file, log_dir.as_deref());

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let application = app::Application::build(&cli)?;
        application.serve().await
    })
}
