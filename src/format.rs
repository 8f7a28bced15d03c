use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StreamError;

/// Default hardware buffer depth in samples, used when the caller passes no
/// `bufflen` option.
pub const DEFAULT_BUFFER_SIZE: usize = 16384;

/// Stream direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Rx,
    Tx,
}

/// Wire format of the samples exchanged with the caller. All formats are
/// complex interleaved (I then Q per sample).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamFormat {
    /// 8-bit signed I/Q
    Cs8,
    /// 16-bit signed I/Q
    Cs16,
    /// 32-bit float I/Q
    Cf32,
}

impl StreamFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamFormat::Cs8 => "CS8",
            StreamFormat::Cs16 => "CS16",
            StreamFormat::Cf32 => "CF32",
        }
    }

    /// Bytes per complex sample in this wire format.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            StreamFormat::Cs8 => 2,
            StreamFormat::Cs16 => 4,
            StreamFormat::Cf32 => 8,
        }
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamFormat {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CS8" => Ok(StreamFormat::Cs8),
            "CS16" => Ok(StreamFormat::Cs16),
            "CF32" => Ok(StreamFormat::Cf32),
            other => Err(StreamError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Wire formats supported in either direction.
pub fn stream_formats() -> Vec<StreamFormat> {
    vec![StreamFormat::Cs8, StreamFormat::Cs16, StreamFormat::Cf32]
}

/// The hardware's own sample representation: 16-bit signed with 12
/// significant bits, so full scale is 2048.
pub fn native_format() -> (StreamFormat, f64) {
    (StreamFormat::Cs16, 2048.0)
}

/// Value type of a stream option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArgType {
    Bool,
    Int,
    Float,
    String,
}

/// Metadata describing one stream option, for the configuration layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamArgInfo {
    pub key: String,
    pub value: String,
    pub name: String,
    pub description: String,
    pub units: String,
    pub kind: ArgType,
}

/// Options accepted by stream setup.
pub fn stream_args_info() -> Vec<StreamArgInfo> {
    vec![StreamArgInfo {
        key: "bufflen".to_string(),
        value: DEFAULT_BUFFER_SIZE.to_string(),
        name: "Buffer Size".to_string(),
        description: "Number of samples in rx buffer.".to_string(),
        units: "samples".to_string(),
        kind: ArgType::Int,
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_string_round_trip() {
        for fmt in stream_formats() {
            assert_eq!(fmt.as_str().parse::<StreamFormat>().unwrap(), fmt);
        }
    }

    #[test]
    fn test_unknown_format_rejected() {
        let err = "CU8".parse::<StreamFormat>().unwrap_err();
        match err {
            StreamError::UnsupportedFormat(s) => assert_eq!(s, "CU8"),
            other => panic!("Expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_native_format_full_scale() {
        let (fmt, full_scale) = native_format();
        assert_eq!(fmt, StreamFormat::Cs16);
        assert_eq!(full_scale, 2048.0);
    }

    #[test]
    fn test_args_info_lists_bufflen() {
        let args = stream_args_info();
        assert_eq!(args.len(), 1);
        assert_eq!(args[0].key, "bufflen");
        assert_eq!(args[0].value, "16384");
        assert_eq!(args[0].kind, ArgType::Int);
    }
}
