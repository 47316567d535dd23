use clap::Parser;

/// Time-of-use bridge for register-mapped inverters
#[derive(Debug, Parser)]
#[clap(author, version)]
pub struct Options {
    /// Config file to read
    #[clap(short = 'c', long = "config", default_value = "config.yaml")]
    pub config_file: String,

    /// Run one command (e.g. getTouCharging) against the device, print the result and exit
    #[clap(long = "dispatch")]
    pub dispatch: Option<String>,

    /// Print the writable domains and their fields for the configured profile and exit
    #[clap(long = "schema")]
    pub schema: bool,
}

impl Options {
    pub fn new() -> Self {
        Self::parse()
    }
}

