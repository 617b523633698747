pub mod memory;
pub mod terminal;

use std::fmt;

use crate::models::chat::{ ChartImage, ChatMessage };

pub use memory::RecordingSurface;
pub use terminal::TerminalSurface;

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// The elements a host UI has to provide before a handler can be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementId {
    Container,
    MessageList,
    Input,
    SendControl,
    LoadingIndicator,
    CloseControl,
}

impl ElementId {
    pub const ALL: [ElementId; 6] = [
        ElementId::Container,
        ElementId::MessageList,
        ElementId::Input,
        ElementId::SendControl,
        ElementId::LoadingIndicator,
        ElementId::CloseControl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ElementId::Container => "chat-container",
            ElementId::MessageList => "chat-box",
            ElementId::Input => "message",
            ElementId::SendControl => "send-btn",
            ElementId::LoadingIndicator => "loading",
            ElementId::CloseControl => "chat-close",
        }
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Host UI the exchange handler draws into.
pub trait ChatSurface: Send {
    fn has_element(&self, id: ElementId) -> bool;

    /// Appends to the message list and keeps it scrolled to the newest entry.
    fn append_message(&mut self, message: &ChatMessage);

    fn clear_input(&mut self);

    fn set_loading(&mut self, visible: bool);

    /// Readies a chart for the next appended message. An `Err` means the
    /// surface cannot show these bytes.
    fn prepare_image(&mut self, image: &ChartImage) -> Result<(), String>;

    fn close(&mut self);
}

pub fn check_png_signature(bytes: &[u8]) -> Result<(), String> {
    if bytes.starts_with(&PNG_SIGNATURE) {
        Ok(())
    } else {
        Err(format!("not a PNG image ({} bytes without PNG signature)", bytes.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_check_accepts_png_header_only() {
        let mut png = PNG_SIGNATURE.to_vec();
        png.extend_from_slice(b"\x00\x00\x00\x0dIHDR");
        assert!(check_png_signature(&png).is_ok());
        assert!(check_png_signature(b"GIF89a").is_err());
        assert!(check_png_signature(&PNG_SIGNATURE[..7]).is_err());
    }

    #[test]
    fn element_ids_display_as_host_ids() {
        let ids: Vec<String> = ElementId::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(ids, vec!["chat-container", "chat-box", "message", "send-btn", "loading", "chat-close"]);
    }
}
