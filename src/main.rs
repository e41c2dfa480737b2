// Copyright (C) 2025 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::error::Error;
use std::path::PathBuf;

use clap::{crate_version, Parser, Subcommand};
use pareidolia::config::{init_installation, load_catalog};
use pareidolia::midi;
use pareidolia::scheduler::layout::{layout, Canvas, MAX_LAYOUT_SLOTS};
use tracing::info;

const SYSTEMD_SERVICE: &str = r#"
[Unit]
Description=pareidolia video installation
After=sound.target

[Service]
Type=simple
Restart=on-failure
EnvironmentFile=-/etc/default/pareidolia
ExecStart=/usr/local/bin/pareidolia start "$PAREIDOLIA_CONFIG"

[Install]
WantedBy=multi-user.target
Alias=pareidolia.service
"#;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A MIDI-triggered video clip scheduler."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Loads, verifies and lists the clips in the given catalog.
    Clips {
        /// The path to the clip catalog.
        path: String,
    },
    /// Lists the available MIDI input devices.
    MidiDevices {},
    /// Prints the screen layout for the given number of clips.
    Layout {
        /// The number of clips playing at once.
        count: usize,
        /// The width of the output surface.
        #[arg(long, default_value_t = 1920)]
        width: u32,
        /// The height of the output surface.
        #[arg(long, default_value_t = 1080)]
        height: u32,
    },
    /// Start will start the installation.
    Start {
        /// The path to the player config.
        player_path: String,
    },
    /// Prints a systemd service definition to stdout.
    Systemd {},
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Clips { path } => {
            let catalog = load_catalog(&PathBuf::from(&path))?;
            if catalog.is_empty() {
                println!("No clips found in {}.", path);
                return Ok(());
            }

            println!("Clips (count: {}):", catalog.len());
            for clip in catalog.clips() {
                println!("- {}", clip);
            }
        }
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Layout {
            count,
            width,
            height,
        } => {
            let canvas = Canvas::new(width, height);
            let rects = layout(canvas, count);
            if rects.is_empty() {
                return Err(format!(
                    "no layout for {} clips, expected 1 to {}",
                    count, MAX_LAYOUT_SLOTS
                )
                .into());
            }

            println!("Layout for {} clips on {}:", count, canvas);
            for (slot, rect) in rects.iter().enumerate() {
                println!("- slot {}: {}", slot, rect);
            }
        }
        Commands::Start { player_path } => {
            let stats = init_installation(&PathBuf::from(player_path))?
                .join()
                .await?;
            info!(stats = %stats, "Installation stopped.");
        }
        Commands::Systemd {} => {
            println!("{}", SYSTEMD_SERVICE)
        }
    }

    Ok(())
}
