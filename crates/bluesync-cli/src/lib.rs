//! Command-line driver for the bluesync device state core.
//!
//! The `bluesync` binary feeds recorded or hand-written Bluetooth stack
//! events through a [`bluesync_core::BluetoothManager`] whose profile
//! services are in-memory mocks, then prints what subscribers observed and
//! the resulting device registry.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `replay` | Apply an event script, print notifications and devices |
//! | `check` | Parse an event script and summarize it |
//! | `profiles` | List supported profiles |
//! | `config` | Show, locate, or initialize the configuration file |
//!
//! # Event Scripts
//!
//! Scripts are JSON Lines, one event per line, see [`bluesync_core::replay`]:
//!
//! ```text
//! {"kind":"service_connected","profile":"a2dp"}
//! {"kind":"device_found","address":"AA:BB:CC:DD:EE:FF","name":"Headset"}
//! {"kind":"bond_state_changed","address":"AA:BB:CC:DD:EE:FF","state":"bonded"}
//! ```
//!
//! # Configuration
//!
//! The CLI reads `~/.config/bluesync/config.toml` (or platform equivalent),
//! or the file named by `--config` / `BLUESYNC_CONFIG`:
//!
//! ```toml
//! format = "json"
//! no_color = false
//!
//! [manager]
//! event_capacity = 256
//! query_timeout_ms = 5000
//! profiles = ["a2dp", "headset"]
//! ```
//!
//! # Environment Variables
//!
//! - `BLUESYNC_CONFIG`: Config file path
//! - `NO_COLOR`: Disable colored output when set
//! - `RUST_LOG`: Log filter when neither `--verbose` nor `--quiet` is given
//!
//! # Examples
//!
//! ```bash
//! bluesync replay pairing.jsonl --prefer AA:BB:CC:DD:EE:FF --query AA:BB:CC:DD:EE:FF
//! bluesync check pairing.jsonl --format json
//! ```

pub mod cli;
pub mod commands;
pub mod config;
pub mod format;
