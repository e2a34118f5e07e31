//! hmd-tether
//!
//! Connects an Android phone running a viewer app as a tethered HMD and
//! streams a generated test pattern to it while logging head orientation.

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use common::{DeviceIdentity, DisconnectReason, TetherEvent, setup_logging};
use host::compress::BYTES_PER_PIXEL;
use host::config::{HostConfig, load_config};
use host::{LibraryContext, SubmitStatus, Tether};
use protocol::ViewerParams;
use std::time::Duration;
use tokio::signal;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "hmd-tether")]
#[command(
    author,
    version,
    about = "hmd-tether - Use an Android phone as a USB-tethered head-mounted display"
)]
#[command(long_about = "
Switches an Android phone into USB accessory mode, waits for the viewer
app's handshake and then streams JPEG frames to it while reading back head
orientation.

EXAMPLES:
    # Connect to whichever phone is attached
    hmd-tether

    # Connect to a specific phone
    hmd-tether --device 0x18d1:0x4ee2

    # List attached Android phones and exit
    hmd-tether --list-devices

    # Same, as JSON for scripts
    hmd-tether --list-devices --json

    # Stream the test pattern at 60 frames per second with debug logging
    hmd-tether --fps 60 --log-level debug

CONFIGURATION:
    The host looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/hmd-tether/host.toml
    3. /etc/hmd-tether/host.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// List Android devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Print the device list as JSON (with --list-devices)
    #[arg(long, requires = "list_devices")]
    json: bool,

    /// Device to connect to, as VID:PID (e.g. 0x18d1:0x4ee2)
    #[arg(short, long, value_name = "VID:PID")]
    device: Option<DeviceIdentity>,

    /// Test pattern frame rate
    #[arg(long, value_name = "N", default_value_t = 30)]
    fps: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.save_config {
        let config = HostConfig::default();
        let path = HostConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    let config = match args.config.as_deref() {
        Some(path) => load_config(path).context("Failed to load configuration")?,
        None => HostConfig::load_or_default(),
    };

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.host.log_level.clone());
    setup_logging(&log_level).context("Failed to setup logging")?;

    info!("hmd-tether v{}", env!("CARGO_PKG_VERSION"));
    info!("Log level: {}", log_level);

    let max_image_bytes = config.stream.max_image_bytes;
    let context = LibraryContext::shared(&config.jpeg);
    let tether = Tether::new(context, config);

    if args.list_devices {
        return list_devices_mode(tether, args.json).await;
    }

    if args.fps == 0 {
        bail!("--fps must be at least 1");
    }

    run(tether, args.device, args.fps, max_image_bytes).await
}

/// List Android devices and exit
async fn list_devices_mode(tether: Tether, json: bool) -> Result<()> {
    info!("Listing Android devices...");

    let devices = tokio::task::spawn_blocking(move || tether.list_devices())
        .await
        .context("Device listing task panicked")?
        .context("Failed to list devices")?;

    if json {
        let out = serde_json::to_string_pretty(&devices).context("Failed to encode device list")?;
        println!("{}", out);
        return Ok(());
    }

    if devices.is_empty() {
        println!("No Android devices found.");
    } else {
        println!("Found {} Android device(s):\n", devices.len());
        for device in devices {
            let mode = if device.is_accessory() {
                " (accessory mode)"
            } else {
                ""
            };
            println!("  {}{}", device, mode);
        }
    }

    Ok(())
}

/// Connect, stream the test pattern and report orientation until Ctrl+C or
/// a failure
async fn run(
    tether: Tether,
    device: Option<DeviceIdentity>,
    fps: u32,
    max_image_bytes: usize,
) -> Result<()> {
    let connector = tether.clone();
    tokio::task::spawn_blocking(move || match device {
        Some(identity) => connector.connect(identity),
        None => connector.connect_any(),
    })
    .await
    .context("Connect task panicked")?
    .context("Failed to connect")?;

    let events = tether.events();
    let mut frame_tick = interval(Duration::from_secs(1) / fps);
    frame_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut status_tick = interval(Duration::from_secs(1));

    let mut pattern = TestPattern::default();
    let mut dropped = 0u64;
    let mut rejected_viewer = None;

    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);
    info!("Press Ctrl+C to disconnect");

    let outcome = loop {
        tokio::select! {
            result = &mut ctrl_c => {
                if let Err(e) = result {
                    error!("Error waiting for Ctrl+C: {}", e);
                }
                info!("Received Ctrl+C, disconnecting...");
                tether.disconnect(DisconnectReason::User);
                break Ok(());
            }
            event = events.recv() => match event {
                Ok(TetherEvent::Connected { description }) => {
                    info!("Opened {}, waiting for the viewer", description);
                }
                Ok(TetherEvent::Streaming { viewer }) => {
                    info!(
                        "Viewer ready: {}x{}, IPD {:.1} mm",
                        viewer.width,
                        viewer.height,
                        viewer.interpupillary_distance * 1000.0
                    );
                }
                Ok(TetherEvent::Disconnected { reason }) => {
                    break if reason.is_failure() {
                        Err(anyhow!("{} (code {})", reason, reason.code()))
                    } else {
                        Ok(())
                    };
                }
                Err(e) => break Err(anyhow!(e)),
            },
            _ = frame_tick.tick() => {
                let Some(viewer) = tether.viewer_params() else {
                    continue;
                };
                let Some((width, row_pitch, height)) =
                    pattern_geometry(&viewer, max_image_bytes)
                else {
                    if rejected_viewer != Some(viewer) {
                        warn!(
                            "Unusable viewer size {}x{} (limit {} bytes), not streaming",
                            viewer.width, viewer.height, max_image_bytes
                        );
                        rejected_viewer = Some(viewer);
                    }
                    continue;
                };
                let pixels = pattern.render(width, height);
                match tether.submit_frame(pixels, width, row_pitch, height) {
                    Ok(SubmitStatus::Queued) | Ok(SubmitStatus::NotStreaming) => {}
                    Ok(SubmitStatus::Busy) => dropped += 1,
                    Err(e) => warn!("Frame rejected: {}", e),
                }
            }
            _ = status_tick.tick() => {
                if tether.is_streaming() {
                    let o = tether.orientation();
                    info!(
                        "Orientation x={:+.3} y={:+.3} z={:+.3} w={:+.3} ({} frames dropped)",
                        o.x, o.y, o.z, o.w, dropped
                    );
                }
            }
        }
    };

    debug!("Event loop finished");
    outcome
}

/// Width, row pitch and height of a test frame for `viewer`
///
/// The viewer size comes from the phone; `None` when it is empty or the
/// image would exceed `max_image_bytes`.
fn pattern_geometry(viewer: &ViewerParams, max_image_bytes: usize) -> Option<(u32, u32, u32)> {
    let width = u32::try_from(viewer.width).ok().filter(|w| *w > 0)?;
    let height = u32::try_from(viewer.height).ok().filter(|h| *h > 0)?;
    let row_pitch = width.checked_mul(BYTES_PER_PIXEL as u32)?;
    let len = (row_pitch as usize).checked_mul(height as usize)?;
    (len <= max_image_bytes).then_some((width, row_pitch, height))
}

/// Scrolling BGRX colour bars
#[derive(Default)]
struct TestPattern {
    pixels: Vec<u8>,
    offset: u32,
}

impl TestPattern {
    fn render(&mut self, width: u32, height: u32) -> &[u8] {
        const BARS: [[u8; 4]; 6] = [
            [0xFF, 0xFF, 0xFF, 0],
            [0x00, 0xFF, 0xFF, 0],
            [0xFF, 0xFF, 0x00, 0],
            [0x00, 0xFF, 0x00, 0],
            [0xFF, 0x00, 0xFF, 0],
            [0x00, 0x00, 0xFF, 0],
        ];

        let (w, h) = (width as usize, height as usize);
        self.pixels.resize(w * h * 4, 0);
        let bar_width = (w / BARS.len()).max(1);

        for (y, row) in self.pixels.chunks_exact_mut(w * 4).enumerate() {
            for (x, px) in row.chunks_exact_mut(4).enumerate() {
                let bar = ((x + self.offset as usize) / bar_width) % BARS.len();
                px.copy_from_slice(&BARS[bar]);
                // Darken the bottom half so vertical flips are obvious
                if y >= h / 2 {
                    px[..3].iter_mut().for_each(|c| *c /= 2);
                }
            }
        }

        self.offset = (self.offset + 4) % width.max(1);
        &self.pixels
    }
}
