//! Naming conventions for tables, keys and pivot tables.

fn words(value: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;

    for ch in value.chars() {
        if ch == '_' || ch == '-' || ch.is_whitespace() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.push(ch);
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

pub fn snake(value: &str) -> String {
    words(value)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("_")
}

pub fn kebab(value: &str) -> String {
    words(value)
        .iter()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join("-")
}

pub fn pascal(value: &str) -> String {
    words(value).iter().map(|w| capitalize(w)).collect()
}

pub fn camel(value: &str) -> String {
    let parts = words(value);
    let mut out = String::new();
    for (i, word) in parts.iter().enumerate() {
        if i == 0 {
            out.push_str(&word.to_lowercase());
        } else {
            out.push_str(&capitalize(word));
        }
    }
    out
}

pub fn title(value: &str) -> String {
    words(value)
        .iter()
        .map(|w| capitalize(w))
        .collect::<Vec<_>>()
        .join(" ")
}

/// English plural, good enough for table names.
pub fn plural(value: &str) -> String {
    let lower = value.to_lowercase();
    if let Some(stem) = value.strip_suffix('y') {
        let vowel_before = stem
            .chars()
            .last()
            .is_some_and(|c| "aeiou".contains(c.to_ascii_lowercase()));
        if !vowel_before {
            return format!("{stem}ies");
        }
    }
    if ["s", "sh", "ch", "x", "z"].iter().any(|s| lower.ends_with(s)) {
        return format!("{value}es");
    }
    format!("{value}s")
}

pub fn singular(value: &str) -> String {
    if let Some(stem) = value.strip_suffix("ies") {
        return format!("{stem}y");
    }
    for suffix in ["sses", "shes", "ches", "xes", "zes"] {
        if value.ends_with(suffix) {
            return value[..value.len() - 2].to_string();
        }
    }
    match value.strip_suffix('s') {
        Some(stem) if !stem.ends_with('s') => stem.to_string(),
        _ => value.to_string(),
    }
}

/// `BlogPost` → `blog_posts`.
pub fn table_name(model: &str) -> String {
    let snake = snake(model);
    match snake.rsplit_once('_') {
        Some((head, last)) => format!("{head}_{}", plural(last)),
        None => plural(&snake),
    }
}

/// `User` → `user_id`.
pub fn foreign_key(model: &str) -> String {
    format!("{}_id", snake(model))
}

/// Pivot table for two models: singular snake names in alphabetical order.
pub fn pivot_table(a: &str, b: &str) -> String {
    let mut names = [snake(a), snake(b)];
    names.sort();
    format!("{}_{}", names[0], names[1])
}
