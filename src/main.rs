use std::io;

use eyre::Result;

use skyshed::cli;

fn main() -> Result<()> {
    init()?;
    cli::run()
}

fn init() -> Result<()> {
    color_eyre::install()?;

    tracing_subscriber::fmt()
        .with_env_filter("skyshed=debug")
        .with_writer(io::stderr)
        .init();

    Ok(())
}
