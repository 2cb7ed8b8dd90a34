use crate::error::{Result, ScanError};

use super::SymbolType;

/// Configuration options, numbered like the established reader API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Config {
    /// Enable the symbology or feature
    Enable = 0,
    /// Verify an optional check digit
    AddCheck = 1,
    /// Keep the check digit in the decoded data
    EmitCheck = 2,
    /// Enable the full ASCII character set
    Ascii = 3,
    /// Minimum data length for a valid decode
    MinLen = 0x20,
    /// Maximum data length for a valid decode (0 for unbounded)
    MaxLen = 0x21,
    /// Consecutive frames required before the cache reports a symbol
    Uncertainty = 0x40,
    /// Collect position data
    Position = 0x80,
    /// Column stride of the vertical scan pass
    XDensity = 0x100,
    /// Row stride of the horizontal scan pass
    YDensity = 0x101,
}

impl Config {
    /// Numeric code of the option.
    pub fn value(self) -> i32 {
        self as i32
    }

    /// True for the per-symbology boolean flags.
    pub fn is_flag(self) -> bool {
        (self as i32) < 0x20
    }

    pub(crate) fn bit(self) -> u32 {
        1 << (self as u32)
    }

    fn from_keyword(name: &str) -> Option<(Self, Option<i32>)> {
        Some(match name.to_ascii_lowercase().as_str() {
            "enable" => (Config::Enable, None),
            "disable" => (Config::Enable, Some(0)),
            "add-check" | "addcheck" => (Config::AddCheck, None),
            "emit-check" | "emitcheck" => (Config::EmitCheck, None),
            "ascii" => (Config::Ascii, None),
            "min-length" | "min-len" | "minlen" => (Config::MinLen, None),
            "max-length" | "max-len" | "maxlen" => (Config::MaxLen, None),
            "uncertainty" => (Config::Uncertainty, None),
            "position" => (Config::Position, None),
            "x-density" | "xdensity" => (Config::XDensity, None),
            "y-density" | "ydensity" => (Config::YDensity, None),
            _ => return None,
        })
    }
}

/// Per-symbology decoder configuration: boolean flags plus length limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SymbologyConfig {
    pub(crate) flags: u32,
    pub(crate) min_len: u32,
    pub(crate) max_len: u32,
}

impl SymbologyConfig {
    pub(crate) const fn with_flags(flags: u32) -> Self {
        Self {
            flags,
            min_len: 0,
            max_len: 0,
        }
    }

    pub(crate) const fn lengths(mut self, min_len: u32, max_len: u32) -> Self {
        self.min_len = min_len;
        self.max_len = max_len;
        self
    }

    /// Whether a boolean flag is set.
    pub fn is_set(&self, config: Config) -> bool {
        config.is_flag() && self.flags & config.bit() != 0
    }

    /// Shortcut for [`Config::Enable`].
    pub fn enabled(&self) -> bool {
        self.is_set(Config::Enable)
    }

    /// Raw flag bits.
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Check a decoded length against the configured limits.
    pub fn accepts_len(&self, len: usize) -> bool {
        let len = len as u32;
        len >= self.min_len && (self.max_len == 0 || len <= self.max_len)
    }

    pub(crate) fn set(&mut self, config: Config, value: i32) -> Result<()> {
        match config {
            Config::MinLen | Config::MaxLen => {
                if value < 0 {
                    return Err(ScanError::InvalidValue { config, value });
                }
                if config == Config::MinLen {
                    self.min_len = value as u32;
                } else {
                    self.max_len = value as u32;
                }
            }
            c if c.is_flag() => {
                if value != 0 {
                    self.flags |= c.bit();
                } else {
                    self.flags &= !c.bit();
                }
            }
            _ => return Err(ScanError::InvalidValue { config, value }),
        }
        Ok(())
    }

    pub(crate) fn get(&self, config: Config) -> Option<i32> {
        match config {
            Config::MinLen => Some(self.min_len as i32),
            Config::MaxLen => Some(self.max_len as i32),
            c if c.is_flag() => Some(self.is_set(c) as i32),
            _ => None,
        }
    }
}

/// Parse a textual setting of the form `[symbology.]option[=value]`.
///
/// `*` or a missing symbology applies to all symbologies (`SymbolType::None`).
/// `disable` is shorthand for `enable=0`; a missing value means 1.
pub fn parse_config(setting: &str) -> Result<(SymbolType, Config, i32)> {
    let err = || ScanError::ParseConfig(setting.to_string());
    let (name, value) = match setting.split_once('=') {
        Some((n, v)) => (n.trim(), Some(v.trim().parse::<i32>().map_err(|_| err())?)),
        None => (setting.trim(), None),
    };
    let (symbology, option) = match name.split_once('.') {
        Some(("*", o)) => (SymbolType::None, o),
        Some((s, o)) => (SymbolType::from_keyword(s).ok_or_else(err)?, o),
        None => (SymbolType::None, name),
    };
    let (config, implied) = Config::from_keyword(option).ok_or_else(err)?;
    let value = match (implied, value) {
        (Some(v), None) => v,
        (Some(_), Some(_)) => return Err(err()),
        (None, Some(v)) => v,
        (None, None) => 1,
    };
    Ok((symbology, config, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        assert_eq!(
            parse_config("ean13.disable").unwrap(),
            (SymbolType::Ean13, Config::Enable, 0)
        );
        assert_eq!(
            parse_config("*.x-density=2").unwrap(),
            (SymbolType::None, Config::XDensity, 2)
        );
        assert_eq!(
            parse_config("code39.min-length=4").unwrap(),
            (SymbolType::Code39, Config::MinLen, 4)
        );
        assert_eq!(
            parse_config("position").unwrap(),
            (SymbolType::None, Config::Position, 1)
        );
        assert!(parse_config("bogus.enable").is_err());
        assert!(parse_config("ean13.disable=1").is_err());
    }

    #[test]
    fn test_symbology_config_flags_and_lengths() {
        let mut cfg = SymbologyConfig::with_flags(Config::Enable.bit()).lengths(2, 5);
        assert!(cfg.enabled());
        assert!(!cfg.is_set(Config::AddCheck));
        cfg.set(Config::AddCheck, 1).unwrap();
        assert!(cfg.is_set(Config::AddCheck));
        assert!(cfg.accepts_len(2));
        assert!(!cfg.accepts_len(6));
        cfg.set(Config::MaxLen, 0).unwrap();
        assert!(cfg.accepts_len(600));
        assert!(cfg.set(Config::MinLen, -1).is_err());
        assert!(cfg.set(Config::XDensity, 1).is_err());
    }
}
