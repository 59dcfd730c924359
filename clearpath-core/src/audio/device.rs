//! Input device enumeration.
//!
//! Direction estimation needs two independent channels, so devices that
//! report stereo input are ranked above mono ones.

use serde::{Deserialize, Serialize};

/// Metadata about an audio input device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable device name reported by the OS.
    pub name: String,
    /// Whether this is the system default input device.
    pub is_default: bool,
    /// Channel count of the device's default input config (0 if unknown).
    pub channels: u16,
    /// Heuristic flag for devices that capture system output, not the room.
    pub is_loopback_like: bool,
    /// Best candidate for spatial capture.
    pub is_recommended: bool,
}

impl DeviceInfo {
    pub fn is_stereo(&self) -> bool {
        self.channels >= 2
    }
}

const LOOPBACK_KEYWORDS: &[&str] = &[
    "stereo mix",
    "wave out",
    "what u hear",
    "what you hear",
    "loopback",
    "virtual output",
    "monitor of",
    "speakers (",
    "headphones (",
];

const SPATIAL_KEYWORDS: &[&str] = &[
    "array",
    "binaural",
    "stereo mic",
    "headset",
    "line in",
    "usb",
    "ambisonic",
];

/// Best-effort heuristic for loopback/system-output capture devices.
pub fn is_loopback_like_name(name: &str) -> bool {
    let lowered = name.trim().to_ascii_lowercase();
    LOOPBACK_KEYWORDS.iter().any(|k| lowered.contains(k))
}

/// Score a device for spatial capture. Higher is better.
pub fn spatial_preference_score(name: &str, channels: u16) -> i32 {
    let lowered = name.trim().to_ascii_lowercase();
    let mut score = if is_loopback_like_name(&lowered) { -16 } else { 8 };
    if channels >= 2 {
        score += 10;
    }
    if SPATIAL_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        score += 4;
    }
    score
}

/// Mark the best entry as recommended and sort best-first.
pub fn rank_devices(mut list: Vec<DeviceInfo>) -> Vec<DeviceInfo> {
    if let Some((idx, _)) = list.iter().enumerate().max_by_key(|(_, d)| {
        spatial_preference_score(&d.name, d.channels) + if d.is_default { 2 } else { 0 }
    }) {
        if let Some(best) = list.get_mut(idx) {
            best.is_recommended = true;
        }
    }

    list.sort_by_key(|d| {
        (
            !d.is_recommended,
            !d.is_stereo(),
            d.is_loopback_like,
            !d.is_default,
            d.name.to_ascii_lowercase(),
        )
    });
    list
}

/// List all available audio input devices on the system.
///
/// Returns an empty `Vec` if cpal is not available or no devices exist.
#[cfg(feature = "audio-cpal")]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    use cpal::traits::{DeviceTrait, HostTrait};

    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());

    match host.input_devices() {
        Ok(devices) => {
            let list = devices
                .enumerate()
                .map(|(idx, device)| {
                    let name = device
                        .name()
                        .unwrap_or_else(|_| format!("Input Device {}", idx + 1));
                    let channels = device
                        .default_input_config()
                        .map(|c| c.channels())
                        .unwrap_or(0);
                    DeviceInfo {
                        is_default: default_name.as_deref() == Some(name.as_str()),
                        is_loopback_like: is_loopback_like_name(&name),
                        is_recommended: false,
                        channels,
                        name,
                    }
                })
                .collect::<Vec<_>>();
            rank_devices(list)
        }
        Err(e) => {
            tracing::warn!("failed to enumerate input devices: {e}");
            let Some(default) = host.default_input_device() else {
                return vec![];
            };
            let name = default
                .name()
                .unwrap_or_else(|_| "Default Input Device".to_string());
            let channels = default
                .default_input_config()
                .map(|c| c.channels())
                .unwrap_or(0);
            let is_loopback_like = is_loopback_like_name(&name);
            vec![DeviceInfo {
                name,
                is_default: true,
                channels,
                is_loopback_like,
                is_recommended: !is_loopback_like,
            }]
        }
    }
}

#[cfg(not(feature = "audio-cpal"))]
pub fn list_input_devices() -> Vec<DeviceInfo> {
    vec![]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(name: &str, channels: u16, is_default: bool) -> DeviceInfo {
        DeviceInfo {
            name: name.into(),
            is_default,
            channels,
            is_loopback_like: is_loopback_like_name(name),
            is_recommended: false,
        }
    }

    #[test]
    fn detects_common_loopback_names() {
        assert!(is_loopback_like_name("Stereo Mix (Realtek Audio)"));
        assert!(is_loopback_like_name("Monitor of Built-in Audio"));
        assert!(!is_loopback_like_name("Microphone Array (Realtek)"));
    }

    #[test]
    fn stereo_outranks_mono() {
        assert!(spatial_preference_score("Built-in Mic", 2) > spatial_preference_score("Built-in Mic", 1));
        assert!(spatial_preference_score("Stereo Mix", 2) < spatial_preference_score("Webcam", 1));
    }

    #[test]
    fn stereo_device_recommended_over_mono_default() {
        let ranked = rank_devices(vec![
            device("Built-in Microphone", 1, true),
            device("USB Binaural Headset", 2, false),
            device("Stereo Mix (Realtek Audio)", 2, false),
        ]);
        assert_eq!(ranked[0].name, "USB Binaural Headset");
        assert!(ranked[0].is_recommended);
        assert_eq!(ranked.iter().filter(|d| d.is_recommended).count(), 1);
        assert_eq!(ranked.last().map(|d| d.name.as_str()), Some("Built-in Microphone"));
    }

    #[test]
    fn empty_list_stays_empty() {
        assert!(rank_devices(vec![]).is_empty());
    }
}
