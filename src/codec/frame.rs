use super::CodecError;

// Outbound frames are `<length digits reversed><payload>`. The length is the
// decimal byte length of the payload with its least significant digit first,
// no sign, no padding and no delimiter. The external renderer reads it this
// way so it has to be reproduced exactly.

/// Write `value` in decimal with the digits in reverse order, eg 120 -> "021".
pub fn reverse_digits(value: usize) -> String {
    value.to_string().chars().rev().collect()
}

/// Parse a decimal string written by `reverse_digits`.
pub fn parse_reversed_digits(digits: &str) -> Result<usize, CodecError> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodecError::InvalidLengthPrefix(digits.to_string()));
    }

    digits
        .chars()
        .rev()
        .collect::<String>()
        .parse()
        .map_err(|_| CodecError::InvalidLengthPrefix(digits.to_string()))
}

/// Wrap `payload` in an outbound frame.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let prefix = reverse_digits(payload.len());

    let mut frame = Vec::with_capacity(prefix.len() + payload.len());
    frame.extend_from_slice(prefix.as_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Split a complete frame and return its payload.
///
/// The prefix has no delimiter so the payload must not start with an ASCII
/// digit. Snapshot payloads are JSON objects and always start with `{`.
pub fn decode_frame(frame: &[u8]) -> Result<&[u8], CodecError> {
    let prefix_len = frame.iter().take_while(|b| b.is_ascii_digit()).count();

    if prefix_len == 0 {
        return Err(CodecError::MissingLengthPrefix);
    }

    let (prefix, payload) = frame.split_at(prefix_len);
    let digits: String = prefix.iter().copied().map(char::from).collect();
    let declared = parse_reversed_digits(&digits)?;

    if declared != payload.len() {
        return Err(CodecError::FrameLengthMismatch {
            declared,
            actual: payload.len(),
        });
    }

    Ok(payload)
}
