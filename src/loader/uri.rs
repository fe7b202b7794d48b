use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine,
};
use thiserror::Error;

const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

#[derive(Error, Debug)]
pub enum DataUriError {
    #[error("Couldn't find a Base64 marker in the data URI")]
    MissingBase64Marker,
    #[error("Decoded data would be {size} bytes, the limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("Failed to decode Base64 data: {0}")]
    Decode(#[from] base64::DecodeError),
}

pub fn is_data_uri(uri: &str) -> bool {
    uri.starts_with("data:")
}

/// Decodes a `data:<mime>;base64,<payload>` URI.
///
/// Trailing `=` are treated as zero symbols, and the result is
/// `(len * 6 + 7) / 8` bytes long, where `len` excludes the padding.
pub fn decode_data_uri(uri: &str, max_size: usize) -> Result<Vec<u8>, DataUriError> {
    let (header, payload) = uri
        .split_once(',')
        .ok_or(DataUriError::MissingBase64Marker)?;
    if !header.ends_with(";base64") {
        return Err(DataUriError::MissingBase64Marker);
    }

    let unpadded = payload.trim_end_matches('=');
    let size = (unpadded.len() * 6 + 7) / 8;
    if size > max_size {
        return Err(DataUriError::TooLarge {
            size,
            limit: max_size,
        });
    }

    let mut symbols = String::with_capacity(payload.len());
    symbols.push_str(unpadded);
    symbols.extend(std::iter::repeat('A').take(payload.len() - unpadded.len()));

    let mut data = LENIENT_BASE64.decode(symbols)?;
    data.resize(size, 0);
    Ok(data)
}

/// Decodes `%XX` escapes. Invalid escapes are kept as they are.
pub fn percent_decode(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut output = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(h), Some(l)) = (hex_digit(bytes[i + 1]), hex_digit(bytes[i + 2])) {
                output.push((h << 4) | l);
                i += 3;
                continue;
            }
        }
        output.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&output).into_owned()
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
