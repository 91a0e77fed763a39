use clap::Parser;
use color_eyre::Result;
use strata::app::cli::Cli;
use strata::app::App;

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let cli = Cli::parse();
    let app = App::new(&cli)?;
    app.run()?;

    Ok(())
}
