use std::fmt::Display;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{decode::Encoding, error::Error, events};

/// Number of data bits per character.
///
/// Serialized as the plain number, so configuration files say `8`,
/// not a variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    /// Five data bits.
    Five,

    /// Six data bits.
    Six,

    /// Seven data bits.
    Seven,

    /// Eight data bits.
    Eight,
}

impl TryFrom<u8> for DataBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(format!("Data bits must be 5-8, got {other}")),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> Self {
        match bits {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

/// Parity checking scheme.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// No parity bit.
    #[default]
    None,

    /// Odd parity.
    Odd,

    /// Even parity.
    Even,
}

/// Number of stop bits terminating each character.
///
/// Serialized as the plain number, like [`DataBits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    /// One stop bit.
    One,

    /// Two stop bits.
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(format!("Stop bits must be 1 or 2, got {other}")),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

/// Flow control on the link.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    /// No flow control.
    #[default]
    None,

    /// XON/XOFF software flow control.
    Software,

    /// RTS/CTS hardware flow control.
    Hardware,
}

/// Everything a session needs to know about one logical connection.
///
/// `path` and `baud_rate` are required before a session can open;
/// everything else carries a default. Unknown keys in serialized
/// input are rejected rather than silently accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionConfig {
    /// Identifier of the physical port.
    /// Likely "/dev/ttyACMx" or "COMx".
    pub path: String,

    /// Link speed in bits per second.
    pub baud_rate: u32,

    /// Text decoding applied on the text read path.
    pub encoding: Encoding,

    /// Data bits per character.
    pub data_bits: DataBits,

    /// Parity scheme.
    pub parity: Parity,

    /// Stop bits per character.
    pub stop_bits: StopBits,

    /// Flow control on the link.
    pub flow_control: FlowControl,

    /// Backend read timeout. Doubles as the polling interval.
    pub timeout: Duration,

    /// How many bytes one backend read may return.
    pub read_size: usize,

    /// Replaces the derived per-path read topic when set.
    /// Needed for backends which emit on legacy topic names.
    pub read_topic: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: String::new(),
            baud_rate: 0,
            encoding: Encoding::default(),
            data_bits: DataBits::Eight,
            parity: Parity::default(),
            stop_bits: StopBits::Two,
            flow_control: FlowControl::default(),
            timeout: Duration::from_millis(200),
            read_size: 1024,
            read_topic: None,
        }
    }
}

impl Display for SessionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} @ {} baud", self.path, self.baud_rate)
    }
}

impl SessionConfig {
    /// A configuration for the given port with every other field defaulted.
    pub fn new<S: AsRef<str>>(path: S, baud_rate: u32) -> Self {
        Self {
            path: path.as_ref().into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// The topic the session's inbound data arrives on.
    pub fn read_topic(&self) -> String {
        match &self.read_topic {
            Some(topic) => topic.clone(),
            None => events::read_topic(&self.path),
        }
    }

    /// Check that the configuration can be used to open a port.
    pub fn validate(&self) -> Result<(), Error> {
        if self.path.is_empty() {
            return Err(Error::InvalidConfiguration("`path` must be set".into()));
        }

        if self.baud_rate == 0 {
            return Err(Error::InvalidConfiguration(
                "`baud_rate` must be non-zero".into(),
            ));
        }

        Ok(())
    }

    fn ron() -> ron::Options {
        ron::Options::default()
            .with_default_extension(ron::extensions::Extensions::IMPLICIT_SOME)
            .with_default_extension(ron::extensions::Extensions::UNWRAP_NEWTYPES)
    }

    /// Deserialize a .ron file's contents.
    ///
    /// Unknown keys and out-of-range values are errors,
    /// as is anything [`validate`](Self::validate) rejects.
    pub fn deserialize(input: &str) -> Result<Self, Error> {
        let config = Self::ron()
            .from_str::<SessionConfig>(input)
            .map_err(|e| Error::InvalidConfiguration(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Serialize the configuration in a "pretty" (i.e. non-compact) fashion.
    pub fn serialize_pretty(&self) -> String {
        Self::ron()
            .to_string_pretty(self, ron::ser::PrettyConfig::default())
            .expect("Config should serialize well")
    }

    /// Setup a configuration from a RON file.
    pub fn new_from_path<P: AsRef<Path>>(p: P) -> Result<Self, Error> {
        let s =
            std::fs::read_to_string(p).map_err(|e| Error::InvalidConfiguration(e.to_string()))?;

        Self::deserialize(&s)
    }
}

/// A partial reconfiguration.
///
/// Fields set here replace the session's current values;
/// fields left out are kept as they are.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ConfigDelta {
    /// New port identifier, if changing.
    pub path: Option<String>,

    /// New link speed, if changing.
    pub baud_rate: Option<u32>,
}

impl ConfigDelta {
    /// A delta which only moves the session to another port.
    pub fn path<S: AsRef<str>>(path: S) -> Self {
        Self {
            path: Some(path.as_ref().into()),
            ..Default::default()
        }
    }

    /// A delta which only changes the link speed.
    pub fn baud_rate(baud_rate: u32) -> Self {
        Self {
            baud_rate: Some(baud_rate),
            ..Default::default()
        }
    }

    pub(crate) fn apply(self, config: &mut SessionConfig) {
        if let Some(path) = self.path {
            config.path = path;
        }

        if let Some(baud_rate) = self.baud_rate {
            config.baud_rate = baud_rate;
        }
    }
}
