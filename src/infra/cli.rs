use clap::Parser;

#[derive(Debug, Parser)]
#[command(version, about = "Keeps shopping carts in step with the store and checks them out.")]
pub struct Cli {
    /// Read and validate the configuration, then exit.
    #[arg(long)]
    pub check_config: bool,
}
