use super::PreprocessError;

pub const MIN_TEXT_CHARS: usize = 5;
pub const MAX_TEXT_CHARS: usize = 5000;

const DEVANAGARI: std::ops::RangeInclusive<char> = '\u{0900}'..='\u{097F}';

/// Normalizes complaint text in Hindi, Marathi or English before embedding.
pub fn clean(text: &str) -> String {
    let lowered = text.to_lowercase();
    let without_urls = strip_urls(&lowered);
    let without_emails = strip_emails(&without_urls);
    let collapsed = collapse_whitespace(&without_emails);

    let kept: String = collapsed
        .chars()
        .filter(|&c| is_word_char(c) || c.is_whitespace() || DEVANAGARI.contains(&c))
        .collect();

    kept.trim().to_string()
}

/// Hard truncation by character count.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

pub fn validate(text: &str) -> Result<(), PreprocessError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(PreprocessError::EmptyText);
    }
    if trimmed.chars().count() < MIN_TEXT_CHARS {
        return Err(PreprocessError::TextTooShort(MIN_TEXT_CHARS));
    }
    if text.chars().count() > MAX_TEXT_CHARS {
        return Err(PreprocessError::TextTooLong(MAX_TEXT_CHARS));
    }
    Ok(())
}

// Unicode Alphabetic, so dependent vowel signs outside Devanagari (Bengali,
// Tamil) survive, unlike a regex `\w` over letter/number categories. Viramas
// and nuktas in those scripts are still dropped.
fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

// Drops `http\S+` and `www\.\S+` runs, wherever they start.
fn strip_urls(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;

    while i < chars.len() {
        let is_url_start = starts_with(&chars[i..], "http") || starts_with(&chars[i..], "www.");

        // Both prefixes are four chars and need at least one more non-space.
        if is_url_start && chars.get(i + 4).is_some_and(|c| !c.is_whitespace()) {
            i += 4;
            while i < chars.len() && !chars[i].is_whitespace() {
                i += 1;
            }
            continue;
        }

        out.push(chars[i]);
        i += 1;
    }
    out
}

// A non-whitespace run is an email-like token when it has an '@' with at least
// one character on each side; the whole run goes.
fn strip_emails(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run = String::new();

    let flush = |run: &mut String, out: &mut String| {
        if !is_email_like(run) {
            out.push_str(run);
        }
        run.clear();
    };

    for c in text.chars() {
        if c.is_whitespace() {
            flush(&mut run, &mut out);
            out.push(c);
        } else {
            run.push(c);
        }
    }
    flush(&mut run, &mut out);
    out
}

fn is_email_like(run: &str) -> bool {
    let len = run.chars().count();
    len >= 3
        && run
            .chars()
            .enumerate()
            .any(|(idx, c)| c == '@' && idx >= 1 && idx + 1 < len)
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn starts_with(chars: &[char], prefix: &str) -> bool {
    let mut it = chars.iter();
    prefix.chars().all(|p| it.next() == Some(&p))
}
