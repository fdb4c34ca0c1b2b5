//! Codec for the `function@hexArg1@hexArg2…` call-data convention used by
//! cross-shard transfers and asynchronous calls.

use crate::errors::VMError;

/// Splits call data into a function name and hex-decoded arguments.
/// An empty data payload is not a call.
pub fn parse_call_data(data: &[u8]) -> Result<(String, Vec<Vec<u8>>), VMError> {
    let text = std::str::from_utf8(data)
        .map_err(|_| VMError::InvalidArgument("call data is not valid UTF-8".to_string()))?;
    let mut parts = text.split('@');
    let function = parts
        .next()
        .filter(|f| !f.is_empty())
        .ok_or_else(|| VMError::InvalidArgument("empty function name".to_string()))?
        .to_string();

    let mut arguments = Vec::new();
    for part in parts {
        let decoded = hex::decode(part)
            .map_err(|_| VMError::InvalidArgument(format!("invalid hex argument: {part}")))?;
        arguments.push(decoded);
    }
    Ok((function, arguments))
}

/// Builds call data from a function name and raw arguments.
pub fn build_call_data(function: &str, arguments: &[Vec<u8>]) -> Vec<u8> {
    let mut data = function.to_string();
    for argument in arguments {
        data.push('@');
        data.push_str(&hex::encode(argument));
    }
    data.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let data = build_call_data("transferToVault", &[vec![0x01, 0x02], vec![]]);
        assert_eq!(data, b"transferToVault@0102@".to_vec());
        let (function, args) = parse_call_data(&data).unwrap();
        assert_eq!(function, "transferToVault");
        assert_eq!(args, vec![vec![0x01, 0x02], vec![]]);
    }

    #[test]
    fn plain_function_name_has_no_arguments() {
        let (function, args) = parse_call_data(b"increment").unwrap();
        assert_eq!(function, "increment");
        assert!(args.is_empty());
    }

    #[test]
    fn rejects_empty_and_non_hex() {
        assert!(parse_call_data(b"").is_err());
        assert!(parse_call_data(b"@aa").is_err());
        assert!(parse_call_data(b"fn@zz").is_err());
    }
}
