//! `data:` URL decoding and encoding.

use base64::Engine;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use percent_encoding::percent_decode_str;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    /// Lowercased media type; `text/plain` when the URL names none.
    pub mime: String,
    pub data: Vec<u8>,
}

/// Decode `data:[<mediatype>][;base64],<data>`. Returns `None` for anything
/// that is not a data URL or whose payload does not decode.
pub fn decode_data_url(url: &str) -> Option<DataUrl> {
    let url = url.trim();
    let rest = url
        .get(..5)
        .filter(|p| p.eq_ignore_ascii_case("data:"))
        .map(|_| &url[5..])?;
    let (meta, payload) = rest.split_once(',')?;

    let mut params = meta.split(';').map(str::trim);
    let mime = params
        .next()
        .filter(|m| m.contains('/'))
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "text/plain".to_string());
    let is_base64 = meta
        .split(';')
        .skip(1)
        .any(|p| p.trim().eq_ignore_ascii_case("base64"));

    let data = if is_base64 {
        // Some producers percent-encode the base64 text as well.
        let text = percent_decode_str(payload).decode_utf8().ok()?;
        let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        decode_base64(&compact)?
    } else {
        percent_decode_str(payload).collect()
    };
    Some(DataUrl { mime, data })
}

fn decode_base64(text: &str) -> Option<Vec<u8>> {
    [STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(text).ok())
}

pub fn encode_data_url(mime: &str, data: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(data))
}
