use clap::Parser;
use std::path::PathBuf;

use crate::config;

#[derive(Parser, Debug)]
#[command(name = "peercall")]
#[command(version = "0.1.0")]
#[command(about = "Two-party audio/video calls over a signaling relay", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "peercall.toml")]
    pub config: PathBuf,

    /// Room to join
    #[arg(short, long)]
    pub room: String,

    /// Signaling relay WebSocket URL
    #[arg(short, long)]
    pub signaling_url: Option<String>,

    /// Audio only, no camera
    #[arg(long, action)]
    pub voice_only: bool,

    /// Verbose logging
    #[arg(short, long, action)]
    pub verbose: bool,
}

impl Args {
    /// Load the config file and apply command-line overrides
    pub fn load_config(&self) -> Result<config::Config, Box<dyn std::error::Error>> {
        let mut config = config::Config::load(&self.config)?;
        self.apply(&mut config);
        config.validate()?;
        Ok(config)
    }

    fn apply(&self, config: &mut config::Config) {
        if let Some(ref url) = self.signaling_url {
            config.signaling.url = url.clone();
        }
        if self.voice_only {
            config.media.voice_only = true;
        }
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
    }
}
