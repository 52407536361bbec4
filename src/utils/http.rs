use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};

/// `Content-Disposition` value with an ASCII fallback and an RFC 5987 name.
pub fn content_disposition(inline: bool, filename: &str) -> String {
    let disposition = if inline { "inline" } else { "attachment" };
    let fallback: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();
    let encoded = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();
    format!("{disposition}; filename=\"{fallback}\"; filename*=UTF-8''{encoded}")
}
