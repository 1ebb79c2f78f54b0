/// A banned word found in the recognized text of one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordMatch {
    pub image_url: String,
    pub word: String,
}

/// Outcome of one pipeline pass over a message's image references.
/// Immutable once produced; cached as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub matched: bool,
    pub matches: Vec<WordMatch>,
}

impl ScanResult {
    pub fn clean() -> Self {
        Self {
            matched: false,
            matches: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CoalescerSnapshot {
    pub pending_authors: usize,
    pub queued_messages: usize,
}
