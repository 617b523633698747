use std::collections::HashSet;

use super::{ check_png_signature, ChatSurface, ElementId };
use crate::models::chat::{ ChartImage, ChatMessage };

/// In-memory surface. Records everything the handler does to it; used for
/// headless embedding and in tests.
#[derive(Debug, Default)]
pub struct RecordingSurface {
    pub messages: Vec<ChatMessage>,
    pub input: String,
    pub loading: bool,
    /// Every visibility change of the loading indicator, in order.
    pub loading_changes: Vec<bool>,
    pub closed: bool,
    pub reject_images: bool,
    missing: HashSet<ElementId>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn without(mut self, id: ElementId) -> Self {
        self.missing.insert(id);
        self
    }

    pub fn rejecting_images(mut self) -> Self {
        self.reject_images = true;
        self
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    pub fn texts(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.text.as_str()).collect()
    }
}

impl ChatSurface for RecordingSurface {
    fn has_element(&self, id: ElementId) -> bool {
        !self.missing.contains(&id)
    }

    fn append_message(&mut self, message: &ChatMessage) {
        self.messages.push(message.clone());
    }

    fn clear_input(&mut self) {
        self.input.clear();
    }

    fn set_loading(&mut self, visible: bool) {
        self.loading = visible;
        self.loading_changes.push(visible);
    }

    fn prepare_image(&mut self, image: &ChartImage) -> Result<(), String> {
        if self.reject_images {
            return Err("surface refused the image".to_string());
        }
        check_png_signature(&image.png)
    }

    fn close(&mut self) {
        self.closed = true;
    }
}
