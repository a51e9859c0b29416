//! Link-layer framing selectors: protocol style and the headers flag.

use serde::{Deserialize, Serialize};

/// ELM327 protocol numbers at or above this value are ISO 15765-4 (CAN).
pub const CAN_PROTOCOL_THRESHOLD: u8 = 6;

/// Link-layer framing family reported by the adapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    /// ISO 9141-2, ISO 14230-4 (KWP) or SAE J1850.
    Legacy,
    /// ISO 15765-4.
    #[default]
    Can,
}

impl Style {
    /// Derive the style from `ATDPN` output such as `"6"`, `"A6"` or `"3"`.
    ///
    /// A leading `A` means the protocol was auto-selected and is ignored.
    pub fn from_protocol_number(text: &str) -> Option<Self> {
        let text = text.trim();
        let digits = text
            .strip_prefix('A')
            .or_else(|| text.strip_prefix('a'))
            .unwrap_or(text);
        let number = u8::from_str_radix(digits, 16).ok()?;
        Some(if number >= CAN_PROTOCOL_THRESHOLD {
            Self::Can
        } else {
            Self::Legacy
        })
    }
}

/// Whether the adapter prints header bytes (`ATH1`) in front of each line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Headers {
    On,
    #[default]
    Off,
}

impl From<bool> for Headers {
    fn from(on: bool) -> Self {
        if on { Self::On } else { Self::Off }
    }
}

/// The four wire layouts the formatter knows how to reassemble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameLayout {
    CanHeaders,
    CanNoHeaders,
    LegacyHeaders,
    LegacyNoHeaders,
}

impl FrameLayout {
    pub fn new(style: Style, headers: Headers) -> Self {
        match (style, headers) {
            (Style::Can, Headers::On) => Self::CanHeaders,
            (Style::Can, Headers::Off) => Self::CanNoHeaders,
            (Style::Legacy, Headers::On) => Self::LegacyHeaders,
            (Style::Legacy, Headers::Off) => Self::LegacyNoHeaders,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_numbers_select_style() {
        assert_eq!(Style::from_protocol_number("6"), Some(Style::Can));
        assert_eq!(Style::from_protocol_number("A6"), Some(Style::Can));
        assert_eq!(Style::from_protocol_number("9"), Some(Style::Can));
        assert_eq!(Style::from_protocol_number("C"), Some(Style::Can));
        assert_eq!(Style::from_protocol_number("A3"), Some(Style::Legacy));
        assert_eq!(Style::from_protocol_number("1"), Some(Style::Legacy));
        assert_eq!(Style::from_protocol_number("?"), None);
    }

    #[test]
    fn layout_from_style_and_headers() {
        assert_eq!(FrameLayout::new(Style::Can, Headers::On), FrameLayout::CanHeaders);
        assert_eq!(
            FrameLayout::new(Style::Legacy, Headers::from(false)),
            FrameLayout::LegacyNoHeaders
        );
    }
}
