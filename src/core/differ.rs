use sha2::{Digest, Sha256};

/// Tracks the hash of the last analyzed source so unchanged text is not
/// analyzed twice.
#[derive(Debug, Clone, Default)]
pub struct SourceDiffer {
    last_hash: Option<String>,
}

impl SourceDiffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calculate SHA256 hash of content
    pub fn hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn has_changed(&self, content: &str) -> bool {
        self.last_hash.as_deref() != Some(Self::hash(content).as_str())
    }

    pub fn mark_analyzed(&mut self, content: &str) {
        self.last_hash = Some(Self::hash(content));
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }
}
