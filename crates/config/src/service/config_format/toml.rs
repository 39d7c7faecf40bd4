use std::ffi::{OsStr, OsString};

use crate::BoxError;

use super::ConfigFormat;
#[derive(Debug, Clone)]
pub struct Toml {
    pub extension: OsString,
}

impl Default for Toml {
    fn default() -> Self {
        Self {
            extension: OsString::from("toml"),
        }
    }
}

impl ConfigFormat for Toml {
    fn extension(&self) -> &OsStr {
        &self.extension
    }
    fn de<T: serde::de::DeserializeOwned>(&self, slice: &[u8]) -> Result<T, BoxError> {
        let text = std::str::from_utf8(slice).map_err(|e| -> BoxError { format!("membership file is not utf-8: {e}").into() })?;
        Ok(toml::from_str(text)?)
    }
    fn ser<T: serde::Serialize>(&self, t: &T) -> Result<Vec<u8>, BoxError> {
        Ok(toml::to_string_pretty(t)?.into())
    }
}
