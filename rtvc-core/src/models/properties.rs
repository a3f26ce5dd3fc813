//! Property sheet describing the source's user-facing controls.
//!
//! Built at configuration time from the device backend and the engine's voice
//! table; serialized for whatever UI the host renders.

use serde::Serialize;

use super::audio_models::DeviceDescriptor;
use super::config::LatencyTier;

/// One entry of an integer-valued list control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListItem {
    pub label: String,
    pub value: i64,
}

/// Float slider range with a display suffix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SliderRange {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub suffix: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceProperties {
    pub devices: Vec<ListItem>,
    pub latency: Vec<ListItem>,
    pub input_gain: SliderRange,
    pub output_gain: SliderRange,
    pub pitch_shift: SliderRange,
    pub pitch_shift_mode: Vec<ListItem>,
    pub pitch_snap: SliderRange,
    pub primary_voice: Vec<ListItem>,
    pub secondary_voice: Vec<ListItem>,
    pub amount: SliderRange,
}

/// Sentinel secondary-voice value that disables blending.
pub const NO_SECONDARY_VOICE: i32 = -1;

impl SourceProperties {
    /// Assemble the sheet. `voices` pairs each engine voice id with its name.
    pub fn build(devices: &[DeviceDescriptor], voices: &[(i32, String)]) -> Self {
        let devices = devices
            .iter()
            .map(|d| ListItem {
                label: d.name.clone(),
                value: d.index as i64,
            })
            .collect();

        let latency = LatencyTier::ALL
            .iter()
            .map(|tier| ListItem {
                label: tier.name().to_string(),
                value: tier.multiplier() as i64,
            })
            .collect();

        let primary_voice: Vec<ListItem> = voices
            .iter()
            .map(|(id, name)| ListItem {
                label: name.clone(),
                value: *id as i64,
            })
            .collect();

        let mut secondary_voice = Vec::with_capacity(primary_voice.len() + 1);
        secondary_voice.push(ListItem {
            label: "none".into(),
            value: NO_SECONDARY_VOICE as i64,
        });
        secondary_voice.extend(primary_voice.iter().cloned());

        let gain = SliderRange {
            min: -6.0,
            max: 6.0,
            step: 0.01,
            suffix: " db",
        };
        let percent = SliderRange {
            min: 0.0,
            max: 100.0,
            step: 1.0,
            suffix: " %",
        };

        Self {
            devices,
            latency,
            input_gain: gain.clone(),
            output_gain: gain,
            pitch_shift: SliderRange {
                min: -1200.0,
                max: 1200.0,
                step: 1.0,
                suffix: " cent",
            },
            pitch_shift_mode: vec![
                ListItem {
                    label: "song".into(),
                    value: 0,
                },
                ListItem {
                    label: "talk".into(),
                    value: 1,
                },
            ],
            pitch_snap: percent.clone(),
            primary_voice,
            secondary_voice,
            amount: percent,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secondary_list_starts_with_none() {
        let voices = vec![(0, "alto".to_string()), (1, "bass".to_string())];
        let props = SourceProperties::build(&[], &voices);

        assert_eq!(props.primary_voice.len(), 2);
        assert_eq!(props.secondary_voice.len(), 3);
        assert_eq!(props.secondary_voice[0].value, -1);
        assert_eq!(props.secondary_voice[0].label, "none");
        assert_eq!(props.secondary_voice[2].label, "bass");
    }

    #[test]
    fn latency_list_covers_all_tiers() {
        let props = SourceProperties::build(&[], &[]);
        assert_eq!(props.latency.len(), 13);
        assert_eq!(props.latency[0].value, 1);
        assert_eq!(props.latency[6].label, "middle-latency");
    }

    #[test]
    fn devices_keep_their_index() {
        let devices = vec![DeviceDescriptor {
            index: 3,
            name: "Headset Microphone".into(),
            id: "{0.0.1.00000000}".into(),
            is_default: true,
        }];
        let props = SourceProperties::build(&devices, &[]);
        assert_eq!(props.devices[0].value, 3);

        let json = serde_json::to_string(&props).unwrap();
        assert!(json.contains("Headset Microphone"));
    }
}
