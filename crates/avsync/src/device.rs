//! Output device discovery and stream configuration.
//!
//! Thin wrappers around CPAL for:
//! - listing output devices with their supported rates
//! - selecting the default device or one matched by name substring
//! - choosing a stream config close to a target sample rate

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};
use serde::Serialize;

/// Output device metadata for `--list-devices`.
#[derive(Clone, Debug, Serialize)]
pub struct OutputDeviceInfo {
    pub index: usize,
    pub name: String,
    pub default_rate: Option<u32>,
    pub min_rate: Option<u32>,
    pub max_rate: Option<u32>,
    pub is_default: bool,
}

/// Pick the first output device whose name contains `needle` (case-insensitive), or the
/// host default when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let Some(needle) = needle else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default output device"));
    };

    host.output_devices()
        .context("No output devices")?
        .find(|d| {
            d.description()
                .map(|desc| matches_device_name(&desc.name(), needle))
                .unwrap_or(false)
        })
        .ok_or_else(|| anyhow!("No output device matched: {needle}"))
}

/// Choose an output config for `target_rate`.
///
/// Ranges that can run at or below the target win over ranges that cannot; among those the
/// higher rate wins, then the better sample format (`f32` first).
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig> {
    let mut best: Option<(Candidate, cpal::SupportedStreamConfig)> = None;
    for range in device
        .supported_output_configs()
        .context("query output configs")?
    {
        let rate = rate_within(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let candidate = Candidate {
            fits: target_rate.is_none_or(|t| rate <= t),
            rate,
            format_rank: sample_format_rank(range.sample_format()),
        };
        if best.as_ref().is_none_or(|(b, _)| candidate.beats(b)) {
            best = Some((candidate, range.with_sample_rate(rate)));
        }
    }
    best.map(|(_, cfg)| cfg)
        .ok_or_else(|| anyhow!("No supported output configs"))
}

/// Fixed buffer size when the device advertises a range, capped at 16k frames.
///
/// `None` leaves the choice to CPAL.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    const MAX_FRAMES: u32 = 16_384;
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed((*max).min(MAX_FRAMES).max(*min)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

pub fn list_devices(host: &cpal::Host) -> Result<Vec<OutputDeviceInfo>> {
    let default_name = host
        .default_output_device()
        .and_then(|d| d.description().ok())
        .map(|d| d.name().to_string());

    let mut out = Vec::new();
    for (index, device) in host
        .output_devices()
        .context("No output devices")?
        .enumerate()
    {
        let name = device.description()?.name().to_string();
        let mut min_rate: Option<u32> = None;
        let mut max_rate: Option<u32> = None;
        if let Ok(ranges) = device.supported_output_configs() {
            for r in ranges {
                min_rate = Some(min_rate.map_or(r.min_sample_rate(), |m| m.min(r.min_sample_rate())));
                max_rate = Some(max_rate.map_or(r.max_sample_rate(), |m| m.max(r.max_sample_rate())));
            }
        }
        let default_rate = device.default_output_config().ok().map(|c| c.sample_rate());
        out.push(OutputDeviceInfo {
            index,
            is_default: default_name.as_deref() == Some(name.as_str()),
            name,
            default_rate,
            min_rate,
            max_rate,
        });
    }
    Ok(out)
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    fits: bool,
    rate: u32,
    format_rank: u8,
}

impl Candidate {
    fn beats(&self, other: &Candidate) -> bool {
        if self.fits != other.fits {
            self.fits
        } else if self.rate != other.rate {
            self.rate > other.rate
        } else {
            self.format_rank < other.format_rank
        }
    }
}

fn rate_within(min: u32, max: u32, target: Option<u32>) -> u32 {
    match target {
        Some(t) => t.clamp(min, max.max(min)),
        None => max,
    }
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    !needle.is_empty() && name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_names_match_case_insensitively() {
        assert!(matches_device_name("USB DAC", "dac"));
        assert!(matches_device_name("usb dac", " USB "));
        assert!(!matches_device_name("USB DAC", "speaker"));
        assert!(!matches_device_name("USB DAC", ""));
    }

    #[test]
    fn rate_within_clamps_target() {
        assert_eq!(rate_within(44_100, 96_000, Some(48_000)), 48_000);
        assert_eq!(rate_within(44_100, 96_000, Some(22_050)), 44_100);
        assert_eq!(rate_within(44_100, 96_000, Some(192_000)), 96_000);
        assert_eq!(rate_within(44_100, 96_000, None), 96_000);
    }

    #[test]
    fn candidates_prefer_fit_then_rate_then_format() {
        let fit = Candidate { fits: true, rate: 48_000, format_rank: 2 };
        let over = Candidate { fits: false, rate: 96_000, format_rank: 0 };
        assert!(fit.beats(&over));
        let higher = Candidate { fits: true, rate: 96_000, format_rank: 2 };
        assert!(higher.beats(&fit));
        let float = Candidate { fits: true, rate: 48_000, format_rank: 0 };
        assert!(float.beats(&fit));
        assert!(!fit.beats(&fit));
    }
}
