//! Locally supplied transport parameter configuration

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::transport_parameters::{ParameterValue, TransportParameterId};

/// How the extension body is represented
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum Mode {
    /// Decode the body into [`TransportParameters`](crate::TransportParameters)
    #[default]
    Structured,
    /// Carry the body as uninterpreted bytes
    Opaque,
}

/// Transport parameters to advertise, keyed by parameter name
///
/// Names follow [`TransportParameterId::name`]. Names that do not match any known parameter are
/// kept, and skipped when the configuration is applied.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ParameterConfig {
    values: BTreeMap<String, ParameterValue>,
}

impl ParameterConfig {
    /// Set the parameter called `name`
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> &mut Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Set a parameter by identifier
    pub fn set_param(
        &mut self,
        id: TransportParameterId,
        value: impl Into<ParameterValue>,
    ) -> &mut Self {
        self.set(id.name(), value)
    }

    /// Value configured under `name`
    pub fn get(&self, name: &str) -> Option<&ParameterValue> {
        self.values.get(name)
    }

    /// Iterate over the configured names and values
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParameterValue)> + '_ {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Whether nothing has been configured
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: Into<ParameterValue>> FromIterator<(K, V)> for ParameterConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut config = Self::default();
        for (name, value) in iter {
            config.set(name, value);
        }
        config
    }
}

/// Configuration handed to the extension when producing it
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum LocalParameters {
    /// Named parameters, for [`Mode::Structured`]
    Structured(ParameterConfig),
    /// A complete extension body, for [`Mode::Opaque`]
    Opaque(Bytes),
}

impl LocalParameters {
    /// The mode this configuration is usable with
    pub fn mode(&self) -> Mode {
        match self {
            Self::Structured(_) => Mode::Structured,
            Self::Opaque(_) => Mode::Opaque,
        }
    }
}

impl From<ParameterConfig> for LocalParameters {
    fn from(config: ParameterConfig) -> Self {
        Self::Structured(config)
    }
}

impl From<Bytes> for LocalParameters {
    fn from(body: Bytes) -> Self {
        Self::Opaque(body)
    }
}
