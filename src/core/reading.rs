use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Canonical channel names used by the sampled-data buffers and the pipeline
pub mod channels {
    pub const ECG: &str = "ECG";
    pub const PLETH: &str = "Pleth";
    pub const HEART_RATE: &str = "Heart Rate";
    pub const SPO2: &str = "SpO2";
    pub const RESPIRATION_RATE: &str = "Respiration Rate";
}

// Labels produced by the distiller
const PLETH_LABEL: &str = "PLETH wave label";
const HEART_RATE_LABEL: &str = "Heart Rate";
const SPO2_LABEL: &str = "Arterial Oxygen Saturation";
const RESPIRATION_LABEL: &str = "Respiration Rate";
const NIBP_SYS_LABEL: &str = "non-invasive blood pressure_SYS";
const NIBP_DIA_LABEL: &str = "non-invasive blood pressure_DIA";
const NIBP_MEAN_LABEL: &str = "non-invasive blood pressure_MEAN";
const ETCO2_LABEL: &str = "etCO2";
const AIRWAY_RR_LABEL: &str = "Airway Respiration Rate";

/// A numeric (single value) or waveform (sample run) payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelValue {
    Scalar(f64),
    Wave(Vec<f64>),
}

impl ChannelValue {
    pub fn as_slice(&self) -> &[f64] {
        match self {
            Self::Scalar(v) => std::slice::from_ref(v),
            Self::Wave(v) => v.as_slice(),
        }
    }

    /// Latest value: the scalar itself or the last wave sample
    pub fn latest(&self) -> Option<f64> {
        match self {
            Self::Scalar(v) => Some(*v),
            Self::Wave(v) => v.last().copied(),
        }
    }
}

/// First-pass distiller output: label -> value, as named by the monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawReading {
    pub values: BTreeMap<String, ChannelValue>,
    pub alarms: Vec<String>,
    pub timestamp: SystemTime,
}

impl RawReading {
    pub fn new(timestamp: SystemTime) -> Self {
        Self {
            values: BTreeMap::new(),
            alarms: Vec::new(),
            timestamp,
        }
    }

    fn scalar(&self, label: &str) -> Option<f64> {
        self.values.get(label).and_then(ChannelValue::latest)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BloodPressure {
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
    pub mean: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Airway {
    pub et_co2: Option<f64>,
    pub respiration_rate: Option<f64>,
}

/// One polling cycle's canonical record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CondensedReading {
    pub ecg: Option<ChannelValue>,
    pub pleth: Option<ChannelValue>,
    pub heart_rate: Option<f64>,
    pub spo2: Option<f64>,
    pub respiration_rate: Option<f64>,
    pub non_invasive_blood_pressure: BloodPressure,
    pub airway: Airway,
    pub alarms: Vec<String>,
    pub timestamp: SystemTime,
    /// Outputs merged in by post-processors (e.g. `qos`)
    #[serde(default)]
    pub extras: BTreeMap<String, f64>,
}

impl CondensedReading {
    /// Second-pass distillation into canonical keys.
    ///
    /// The ECG label changes with the active lead (`..._II`, `..._V`), so any
    /// label containing "ECG" is taken as the ECG channel.
    pub fn condense(raw: &RawReading) -> Self {
        let ecg = raw
            .values
            .iter()
            .find(|(label, _)| label.contains("ECG"))
            .map(|(_, value)| value.clone());

        Self {
            ecg,
            pleth: raw.values.get(PLETH_LABEL).cloned(),
            heart_rate: raw.scalar(HEART_RATE_LABEL),
            spo2: raw.scalar(SPO2_LABEL),
            respiration_rate: raw.scalar(RESPIRATION_LABEL),
            non_invasive_blood_pressure: BloodPressure {
                systolic: raw.scalar(NIBP_SYS_LABEL),
                diastolic: raw.scalar(NIBP_DIA_LABEL),
                mean: raw.scalar(NIBP_MEAN_LABEL),
            },
            airway: Airway {
                et_co2: raw.scalar(ETCO2_LABEL),
                respiration_rate: raw.scalar(AIRWAY_RR_LABEL),
            },
            alarms: raw.alarms.clone(),
            timestamp: raw.timestamp,
            extras: BTreeMap::new(),
        }
    }

    /// Samples for a canonical channel name, if present in this reading
    pub fn channel(&self, name: &str) -> Option<&[f64]> {
        match name {
            channels::ECG => self.ecg.as_ref().map(ChannelValue::as_slice),
            channels::PLETH => self.pleth.as_ref().map(ChannelValue::as_slice),
            channels::HEART_RATE => self.heart_rate.as_ref().map(std::slice::from_ref),
            channels::SPO2 => self.spo2.as_ref().map(std::slice::from_ref),
            channels::RESPIRATION_RATE => {
                self.respiration_rate.as_ref().map(std::slice::from_ref)
            }
            _ => None,
        }
    }

    pub fn merge_extras(&mut self, extras: BTreeMap<String, f64>) {
        self.extras.extend(extras);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_with(values: &[(&str, ChannelValue)]) -> RawReading {
        let mut raw = RawReading::new(SystemTime::UNIX_EPOCH);
        for (label, value) in values {
            raw.values.insert(label.to_string(), value.clone());
        }
        raw
    }

    #[test]
    fn test_condense_maps_any_ecg_lead() {
        let raw = raw_with(&[
            ("NOM_ECG_ELEC_POTL_V", ChannelValue::Wave(vec![0.1, 0.2])),
            ("PLETH wave label", ChannelValue::Wave(vec![1.0, 2.0, 3.0])),
            ("Heart Rate", ChannelValue::Scalar(72.0)),
            ("Arterial Oxygen Saturation", ChannelValue::Scalar(98.0)),
        ]);

        let reading = CondensedReading::condense(&raw);

        assert_eq!(reading.ecg, Some(ChannelValue::Wave(vec![0.1, 0.2])));
        assert_eq!(reading.channel(channels::PLETH), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(reading.heart_rate, Some(72.0));
        assert_eq!(reading.channel(channels::SPO2), Some(&[98.0][..]));
    }

    #[test]
    fn test_condense_groups_blood_pressure_and_airway() {
        let raw = raw_with(&[
            ("non-invasive blood pressure_SYS", ChannelValue::Scalar(120.0)),
            ("non-invasive blood pressure_DIA", ChannelValue::Scalar(80.0)),
            ("etCO2", ChannelValue::Scalar(35.0)),
        ]);

        let reading = CondensedReading::condense(&raw);

        assert_eq!(reading.non_invasive_blood_pressure.systolic, Some(120.0));
        assert_eq!(reading.non_invasive_blood_pressure.diastolic, Some(80.0));
        assert_eq!(reading.non_invasive_blood_pressure.mean, None);
        assert_eq!(reading.airway.et_co2, Some(35.0));
        assert!(reading.ecg.is_none());
        assert!(reading.channel("Unknown").is_none());
    }
}
