//! Reversal of the encodings video sites wrap around their player links.

use std::borrow::Cow;
use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("encoded value is empty")]
    Empty,
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("hex payload is not valid UTF-8")]
    Utf8,
    #[error("percent-decoded payload is not valid UTF-8")]
    PercentUtf8,
}

/// Decodes `hex(percent_encode(url))` back into the url.
pub fn decode_hex_url(encoded: &str) -> Result<String, DecodeError> {
    let encoded = encoded.trim();

    if encoded.is_empty() {
        return Err(DecodeError::Empty);
    }

    let bytes = hex::decode(encoded)?;
    let text = String::from_utf8(bytes).map_err(|_| DecodeError::Utf8)?;

    urlencoding::decode(&text)
        .map(Cow::into_owned)
        .map_err(|_| DecodeError::PercentUtf8)
}

fn to_radix(mut num: usize, radix: usize) -> String {
    const DIGITS: &[u8; 62] = b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

    if num == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();

    while num > 0 {
        digits.push(DIGITS[num % radix] as char);
        num /= radix;
    }

    digits.iter().rev().collect()
}

/// Unpacks Dean Edwards style `eval(function(p,a,c,k,e,d){...})` scripts.
///
/// Tokens without a dictionary entry are left as they are, like the packer's
/// own `k[c]||c` lookup.
pub fn unpack_packed_script(code: &str) -> Option<String> {
    static PACKED_REGEX: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?s)}\('(.+)',\s*(\d+),\s*(\d+),\s*'([^']*)'\.split\('\|'\)").unwrap());
    static TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\w+\b").unwrap());

    let captures = PACKED_REGEX.captures(code)?;
    let payload = captures.get(1)?.as_str();
    let radix = captures[2]
        .parse::<usize>()
        .ok()
        .filter(|radix| (2..=62).contains(radix))?;
    let count = captures[3].parse::<usize>().ok()?;
    let words = captures[4].split('|').collect::<Vec<_>>();

    // `count` comes from the page, only the word list bounds the work
    let dictionary = words
        .iter()
        .enumerate()
        .take(count)
        .filter(|(_, word)| !word.is_empty())
        .map(|(index, word)| (to_radix(index, radix), *word))
        .collect::<HashMap<_, _>>();

    let unpacked = TOKEN_REGEX.replace_all(payload, |captures: &regex::Captures| {
        let token = &captures[0];
        dictionary.get(token).copied().unwrap_or(token).to_string()
    });

    Some(unpacked.into_owned())
}

/// Bodies of every packed script found in `source`, unpacked.
pub fn unpack_all(source: &str) -> Vec<String> {
    static EVAL_REGEX: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(?s)eval\(function\(p,a,c,k,e,[rd]\).+?\.split\('\|'\)").unwrap());

    EVAL_REGEX
        .find_iter(source)
        .filter_map(|packed| unpack_packed_script(packed.as_str()))
        .collect()
}
