use serde::{Deserialize, Serialize};

pub const RATING_PREFIX: &str = "rating:";
pub const SCORE_PREFIX: &str = "aesthetic_score:";

const PSEUDO_PREFIXES: [&str; 2] = [RATING_PREFIX, SCORE_PREFIX];

pub fn is_pseudo_tag(tag: &str) -> bool {
    PSEUDO_PREFIXES.iter().any(|p| tag.starts_with(p))
}

/// Ordered set of tags as stored in a sidecar.
///
/// Insertion order is the serialized order. Exact duplicates are collapsed
/// keeping the first occurrence; removal and lookup ignore case.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TagSet {
    tags: Vec<String>,
}

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses comma-separated sidecar content.
    pub fn parse(content: &str) -> Self {
        let mut set = TagSet::new();
        for token in content.split(',') {
            set.insert(token);
        }
        set
    }

    /// Appends `tag` unless it is empty or already present. Returns true if added.
    pub fn insert(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.tags.iter().any(|t| t == tag) {
            return false;
        }
        self.tags.push(tag.to_string());
        true
    }

    pub fn extend<'a, I: IntoIterator<Item = &'a str>>(&mut self, tags: I) {
        for tag in tags {
            self.insert(tag);
        }
    }

    /// Removes every tag equal to `tag` ignoring case. Returns the index of
    /// the first removed tag, if any.
    pub fn remove_ignore_case(&mut self, tag: &str) -> Option<usize> {
        let needle = tag.trim().to_lowercase();
        let first = self.tags.iter().position(|t| t.to_lowercase() == needle)?;
        self.tags.retain(|t| t.to_lowercase() != needle);
        Some(first)
    }

    /// Inserts `tag` at `index` (clamped) unless already present.
    pub fn insert_at(&mut self, index: usize, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() || self.tags.iter().any(|t| t == tag) {
            return false;
        }
        let index = index.min(self.tags.len());
        self.tags.insert(index, tag.to_string());
        true
    }

    /// Removes every tag starting with `prefix` (case-sensitive).
    pub fn strip_prefix(&mut self, prefix: &str) -> usize {
        let before = self.tags.len();
        self.tags.retain(|t| !t.starts_with(prefix));
        before - self.tags.len()
    }

    /// Replaces any `prefix*` tag with a single `prefix + value`.
    pub fn upsert_pseudo(&mut self, prefix: &str, value: &str) {
        self.strip_prefix(prefix);
        self.tags.push(format!("{}{}", prefix, value.trim()));
    }

    pub fn pseudo_value(&self, prefix: &str) -> Option<&str> {
        self.tags
            .iter()
            .rev()
            .find_map(|t| t.strip_prefix(prefix))
            .map(str::trim)
    }

    pub fn rating(&self) -> Option<u8> {
        self.pseudo_value(RATING_PREFIX)?.parse().ok()
    }

    pub fn aesthetic_score(&self) -> Option<f32> {
        self.pseudo_value(SCORE_PREFIX)?.parse().ok()
    }

    /// Keeps only the last occurrence of each pseudo-tag prefix.
    pub fn normalize_pseudo(&mut self) {
        for prefix in PSEUDO_PREFIXES {
            let Some(last) = self.tags.iter().rposition(|t| t.starts_with(prefix)) else {
                continue;
            };
            let mut index = 0;
            self.tags.retain(|t| {
                let keep = !t.starts_with(prefix) || index == last;
                index += 1;
                keep
            });
        }
    }

    pub fn pseudo_tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str).filter(|t| is_pseudo_tag(t))
    }

    pub fn without_pseudo(&self) -> TagSet {
        TagSet {
            tags: self
                .tags
                .iter()
                .filter(|t| !is_pseudo_tag(t))
                .cloned()
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Sidecar text: tags joined by `", "`.
    pub fn to_content(&self) -> String {
        self.tags.join(", ")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    #[default]
    Append,
    Prepend,
    Replace,
}

/// Combines generated tags with the existing set according to `mode`.
pub fn merge_tags(
    existing: &TagSet,
    generated: &TagSet,
    custom: Option<&str>,
    mode: MergeMode,
) -> TagSet {
    let custom = custom.map(str::trim).filter(|c| !c.is_empty());
    let mut merged = TagSet::new();
    match mode {
        MergeMode::Append => {
            merged.extend(existing.iter());
            merged.extend(custom);
            merged.extend(generated.iter());
        }
        MergeMode::Prepend => {
            merged.extend(generated.iter());
            merged.extend(custom);
            merged.extend(existing.iter());
        }
        MergeMode::Replace => {
            merged.extend(generated.iter());
            merged.extend(custom);
            merged.extend(existing.pseudo_tags());
        }
    }
    merged.normalize_pseudo();
    merged
}
