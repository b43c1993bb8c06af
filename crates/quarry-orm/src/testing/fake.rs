//! Random values for factory definitions.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use uuid::Uuid;

const FIRST_NAMES: &[&str] = &[
    "Alice", "Bruno", "Chloe", "David", "Emma", "Felix", "Grace", "Hugo", "Ines", "Jules",
    "Karim", "Lea", "Marc", "Nina", "Oscar", "Paula",
];

const LAST_NAMES: &[&str] = &[
    "Martin", "Bernard", "Dubois", "Thomas", "Robert", "Richard", "Petit", "Durand", "Leroy",
    "Moreau", "Simon", "Laurent",
];

const WORDS: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do",
    "eiusmod", "tempor", "incididunt", "labore", "dolore", "magna", "aliqua", "veniam",
];

const DOMAINS: &[&str] = &["example.com", "example.org", "example.net"];

fn pick_str(values: &[&'static str]) -> &'static str {
    values.choose(&mut rand::thread_rng()).copied().unwrap_or_default()
}

/// Random element of a slice.
pub fn pick<T: Clone>(values: &[T]) -> Option<T> {
    values.choose(&mut rand::thread_rng()).cloned()
}

pub fn first_name() -> String {
    pick_str(FIRST_NAMES).to_string()
}

pub fn last_name() -> String {
    pick_str(LAST_NAMES).to_string()
}

pub fn name() -> String {
    format!("{} {}", first_name(), last_name())
}

/// Unique enough for test data: a random suffix avoids collisions.
pub fn email() -> String {
    format!(
        "{}.{}{}@{}",
        first_name().to_lowercase(),
        last_name().to_lowercase(),
        int_between(1, 9999),
        pick_str(DOMAINS)
    )
}

pub fn word() -> String {
    pick_str(WORDS).to_string()
}

/// `count` words, capitalized, ending with a period.
pub fn sentence(count: usize) -> String {
    let words: Vec<&str> = (0..count.max(1)).map(|_| pick_str(WORDS)).collect();
    let mut text = words.join(" ");
    if let Some(first) = text.get(..1) {
        text = format!("{}{}.", first.to_uppercase(), &text[1..]);
    }
    text
}

pub fn paragraph(sentences: usize) -> String {
    (0..sentences.max(1))
        .map(|_| sentence(int_between(4, 10) as usize))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn slug(words: usize) -> String {
    (0..words.max(1))
        .map(|_| pick_str(WORDS))
        .collect::<Vec<_>>()
        .join("-")
}

/// Inclusive range; bounds are swapped when reversed.
pub fn int_between(min: i64, max: i64) -> i64 {
    let (low, high) = if min <= max { (min, max) } else { (max, min) };
    rand::thread_rng().gen_range(low..=high)
}

pub fn float_between(min: f64, max: f64) -> f64 {
    if min >= max {
        return min;
    }
    rand::thread_rng().gen_range(min..max)
}

pub fn boolean() -> bool {
    rand::thread_rng().r#gen()
}

pub fn uuid() -> String {
    Uuid::new_v4().to_string()
}

pub fn password(length: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// A moment within the last `days` days.
pub fn past_datetime(days: i64) -> DateTime<Utc> {
    let seconds = int_between(0, days.max(0) * 86_400);
    Utc::now() - Duration::seconds(seconds)
}

pub fn future_datetime(days: i64) -> DateTime<Utc> {
    let seconds = int_between(0, days.max(0) * 86_400);
    Utc::now() + Duration::seconds(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_shape() {
        let email = email();
        let (local, domain) = email.split_once('@').unwrap();
        assert!(!local.is_empty());
        assert!(DOMAINS.contains(&domain));
    }

    #[test]
    fn test_ranges() {
        for _ in 0..100 {
            let n = int_between(5, 1);
            assert!((1..=5).contains(&n));
            let f = float_between(0.5, 1.5);
            assert!((0.5..1.5).contains(&f));
        }
        assert_eq!(float_between(2.0, 2.0), 2.0);
    }

    #[test]
    fn test_sentence_is_capitalized() {
        let text = sentence(5);
        assert!(text.ends_with('.'));
        assert!(text.chars().next().unwrap().is_uppercase());
        assert_eq!(text.split(' ').count(), 5);
    }

    #[test]
    fn test_password_length_and_uuid() {
        assert_eq!(password(16).len(), 16);
        assert!(Uuid::parse_str(&uuid()).is_ok());
        assert!(past_datetime(3) <= Utc::now());
    }
}
