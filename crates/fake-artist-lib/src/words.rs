use rand::seq::SliceRandom;
use rand::Rng;

const DEFAULT_WORDS: &[&str] = &[
    "Lighthouse",
    "Octopus",
    "Bicycle",
    "Volcano",
    "Umbrella",
    "Giraffe",
    "Snowman",
    "Castle",
    "Rocket",
    "Cactus",
    "Penguin",
    "Windmill",
    "Guitar",
    "Dragon",
    "Teapot",
    "Rainbow",
    "Submarine",
    "Scarecrow",
    "Hamburger",
    "Treehouse",
    "Robot",
    "Mermaid",
    "Campfire",
    "Pirate Ship",
];

/// Source of secret words.
#[derive(Debug, Clone)]
pub struct WordList {
    words: Vec<String>,
}

impl Default for WordList {
    fn default() -> Self {
        Self::new(DEFAULT_WORDS.iter().copied())
    }
}

impl WordList {
    /// Blank entries are skipped. Falls back to the built-in list if nothing is left.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words
            .into_iter()
            .map(Into::into)
            .filter(|w| !w.trim().is_empty())
            .collect();
        if words.is_empty() {
            return Self::default();
        }
        Self { words }
    }

    pub fn choose<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        // Never empty, see `new`
        self.words.choose(rng).cloned().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}
