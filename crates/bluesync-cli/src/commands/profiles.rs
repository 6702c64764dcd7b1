//! Profiles command implementation.

use std::path::Path;

use anyhow::Result;
use bluesync_core::{ProfileDescriptor, ProfileId};

use crate::cli::OutputFormat;
use crate::format::{FormatOptions, format_profiles, to_json, write_output};

pub fn cmd_profiles(format: OutputFormat, opts: &FormatOptions, output: Option<&Path>) -> Result<()> {
    let profiles: Vec<ProfileDescriptor> = ProfileId::ALL
        .iter()
        .map(|id| ProfileDescriptor::for_profile(*id))
        .collect();
    let content = match format {
        OutputFormat::Json => to_json(&profiles)?,
        OutputFormat::Text => format_profiles(&profiles, opts),
    };
    write_output(output, &content)
}
