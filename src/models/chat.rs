use chrono::Utc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    User,
    Bot,
}

/// A decoded chart ready for display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartImage {
    pub label: Option<String>,
    pub base64: String,
    pub png: Vec<u8>,
}

impl ChartImage {
    pub fn data_uri(&self) -> String {
        format!("data:image/png;base64,{}", self.base64)
    }
}

/// One entry of the visible log. Never changed once appended.
#[derive(Clone, Debug)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    pub image: Option<ChartImage>,
    pub timestamp: i64,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text.into(), None)
    }

    pub fn bot(text: impl Into<String>, image: Option<ChartImage>) -> Self {
        Self::new(Role::Bot, text.into(), image)
    }

    fn new(role: Role, text: String, image: Option<ChartImage>) -> Self {
        Self {
            role,
            text,
            image,
            timestamp: Utc::now().timestamp(),
        }
    }
}
