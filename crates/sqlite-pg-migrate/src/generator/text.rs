//! Fake text for generated catalogue rows.

use rand::seq::SliceRandom;
use rand::{Rng, RngCore};

/// Source of human-looking strings. Output only needs to be plausible.
pub trait TextSource {
    /// A person's full name.
    fn name(&self, rng: &mut dyn RngCore) -> String;

    /// A single capitalized word.
    fn word(&self, rng: &mut dyn RngCore) -> String;

    /// A short title-like phrase.
    fn catch_phrase(&self, rng: &mut dyn RngCore) -> String;

    /// A few sentences of filler text.
    fn paragraph(&self, rng: &mut dyn RngCore) -> String;
}

const FIRST_NAMES: &[&str] = &[
    "Alice", "Anna", "Boris", "Carla", "Daniel", "Diana", "Elena", "Ethan", "Fiona", "George",
    "Hannah", "Igor", "Isabel", "Jack", "Julia", "Kevin", "Laura", "Leo", "Maria", "Mark",
    "Nadia", "Noah", "Olga", "Oscar", "Paula", "Peter", "Rachel", "Roman", "Sofia", "Steven",
    "Tanya", "Thomas", "Ursula", "Victor", "Wendy", "Yuri", "Zoe",
];

const LAST_NAMES: &[&str] = &[
    "Anderson", "Baker", "Carter", "Dawson", "Ellis", "Fischer", "Garcia", "Hughes", "Ivanov",
    "Jensen", "Kowalski", "Lambert", "Morgan", "Novak", "Olsen", "Petrov", "Quinn", "Reyes",
    "Sokolov", "Turner", "Usher", "Volkov", "Walker", "Young", "Zimmer",
];

const ADJECTIVES: &[&str] = &[
    "adaptive", "ancient", "bright", "broken", "crimson", "distant", "electric", "endless",
    "fallen", "forgotten", "frozen", "golden", "hidden", "hollow", "infinite", "last", "lonely",
    "midnight", "nameless", "quiet", "restless", "secret", "silent", "silver", "strange",
    "wandering", "wild",
];

const NOUNS: &[&str] = &[
    "city", "dream", "empire", "frontier", "garden", "harbor", "horizon", "island", "journey",
    "kingdom", "legacy", "machine", "memory", "mirror", "mountain", "night", "ocean", "planet",
    "promise", "river", "road", "shadow", "signal", "storm", "summer", "tower", "voyage", "winter",
];

const FILLER: &[&str] = &[
    "a", "about", "after", "against", "all", "and", "before", "between", "by", "every", "finds",
    "for", "from", "into", "leaves", "must", "never", "of", "old", "only", "over", "returns",
    "the", "their", "through", "to", "together", "under", "until", "with", "young",
];

fn pick<'a>(rng: &mut dyn RngCore, words: &[&'a str]) -> &'a str {
    words.choose(rng).copied().unwrap_or_default()
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Built-in word lists.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lexicon;

impl Lexicon {
    fn sentence(&self, rng: &mut dyn RngCore) -> String {
        let len = rng.gen_range(4..=10);
        let mut words = Vec::with_capacity(len);
        for i in 0..len {
            let word = match i % 3 {
                0 => pick(rng, FILLER),
                1 => pick(rng, ADJECTIVES),
                _ => pick(rng, NOUNS),
            };
            words.push(word);
        }
        format!("{}.", capitalize(&words.join(" ")))
    }
}

impl TextSource for Lexicon {
    fn name(&self, rng: &mut dyn RngCore) -> String {
        format!("{} {}", pick(rng, FIRST_NAMES), pick(rng, LAST_NAMES))
    }

    fn word(&self, rng: &mut dyn RngCore) -> String {
        let pool = if rng.gen_bool(0.5) { ADJECTIVES } else { NOUNS };
        capitalize(pick(rng, pool))
    }

    fn catch_phrase(&self, rng: &mut dyn RngCore) -> String {
        format!(
            "The {} {} of the {} {}",
            capitalize(pick(rng, ADJECTIVES)),
            capitalize(pick(rng, NOUNS)),
            capitalize(pick(rng, ADJECTIVES)),
            capitalize(pick(rng, NOUNS))
        )
    }

    fn paragraph(&self, rng: &mut dyn RngCore) -> String {
        let sentences = rng.gen_range(3..=5);
        (0..sentences)
            .map(|_| self.sentence(rng))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_name_has_two_parts() {
        let mut rng = StdRng::seed_from_u64(1);
        let name = Lexicon.name(&mut rng);
        assert_eq!(name.split(' ').count(), 2);
    }

    #[test]
    fn test_paragraph_is_sentences() {
        let mut rng = StdRng::seed_from_u64(2);
        let text = Lexicon.paragraph(&mut rng);
        assert!(text.ends_with('.'));
        assert!(text.chars().next().unwrap().is_uppercase());
        assert!((3..=5).contains(&text.matches('.').count()));
    }

    #[test]
    fn test_capitalize() {
        assert_eq!(capitalize("storm"), "Storm");
        assert_eq!(capitalize(""), "");
    }

    #[test]
    fn test_same_seed_same_text() {
        let a = Lexicon.catch_phrase(&mut StdRng::seed_from_u64(9));
        let b = Lexicon.catch_phrase(&mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }
}
