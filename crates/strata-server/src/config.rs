use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Server configuration, loaded from an optional TOML file and then
/// overlaid by CLI flags. File values override built-in defaults; CLI
/// flags override file values.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_players")]
    pub max_players: u32,
    #[serde(default = "default_motd")]
    pub motd: String,
    #[serde(default = "default_view_distance")]
    pub view_distance: u8,
    #[serde(default = "default_generator")]
    pub generator: String,
    #[serde(default)]
    pub seed: u32,
    #[serde(default)]
    pub registry_path: Option<PathBuf>,
}

fn default_bind() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    25565
}

fn default_max_players() -> u32 {
    20
}

fn default_motd() -> String {
    "A Strata Server".into()
}

fn default_view_distance() -> u8 {
    10
}

fn default_generator() -> String {
    "noise".into()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
            max_players: default_max_players(),
            motd: default_motd(),
            view_distance: default_view_distance(),
            generator: default_generator(),
            seed: 0,
            registry_path: None,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            let config: ServerConfig = toml::from_str(&contents)?;
            Ok(config)
        } else {
            tracing::info!("No config file found at {}, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Overlay CLI flags that were actually supplied on top of this config.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(port) = cli.port {
            self.port = port;
        }
        if let Some(vd) = cli.view_distance {
            self.view_distance = vd;
        }
        if let Some(ref generator) = cli.generator {
            self.generator = generator.clone();
        }
        if let Some(seed) = cli.seed {
            self.seed = seed;
        }
        if let Some(ref path) = cli.registry_path {
            self.registry_path = Some(path.clone());
        }
    }
}

/// Command-line overlay. Every flag is optional so a bare `strata` run
/// falls through entirely to the config file / built-in defaults.
#[derive(Debug, Parser)]
#[command(name = "strata", about = "A from-scratch Minecraft Java Edition server")]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(long, default_value = "config/server.toml")]
    pub config: PathBuf,

    /// Listen port.
    #[arg(long)]
    pub port: Option<u16>,

    /// View distance in chunks.
    #[arg(long = "view-distance")]
    pub view_distance: Option<u8>,

    /// Terrain-generator id ("flat" or "noise").
    #[arg(long)]
    pub generator: Option<String>,

    /// World seed, used by the noise generator.
    #[arg(long)]
    pub seed: Option<u32>,

    /// Path to the registry/block-data directory.
    #[arg(long = "registry-path")]
    pub registry_path: Option<PathBuf>,
}
