/// Outgoing "chat action" (typing indicator, etc).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
    UploadDocument,
}

/// A named in-memory file sent back to the user (search results).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub caption: Option<String>,
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_documents: bool,
    pub supports_chat_actions: bool,
    pub max_message_len: usize,
    pub max_caption_len: usize,
}

/// Truncate `text` to at most `max_chars` characters, marking the cut.
pub fn truncate_for(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(1);
    let mut out: String = text.chars().take(keep).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundaries() {
        assert_eq!(truncate_for("hello", 10), "hello");
        assert_eq!(truncate_for("héllo wörld", 5), "héll…");
        assert_eq!(truncate_for("abc", 0), "…");
    }
}
