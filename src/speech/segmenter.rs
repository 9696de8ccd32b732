//! Splits article text into utterance-sized chunks.
//!
//! Speech engines misbehave on long utterances (some drop them, some stop
//! firing end events), so text is spoken as a sequence of short chunks. Chunk
//! boundaries always fall between sentences; a sentence longer than the bound
//! is kept whole rather than cut mid-sentence.

/// Split `text` into chunks of roughly at most `max_len` characters.
///
/// Text that already fits is returned as a single chunk, unchanged. Blank text
/// yields no chunks at all.
pub fn segment(text: &str, max_len: usize) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for sentence in sentences(text) {
        let sentence_len = sentence.chars().count();
        if current_len + sentence_len < max_len {
            current.push_str(sentence);
            current.push(' ');
            current_len += sentence_len + 1;
        } else {
            push_trimmed(&mut chunks, &current);
            current.clear();
            current.push_str(sentence);
            current.push(' ');
            current_len = sentence_len + 1;
        }
    }
    push_trimmed(&mut chunks, &current);

    chunks
}

fn push_trimmed(chunks: &mut Vec<String>, chunk: &str) {
    let chunk = chunk.trim();
    if !chunk.is_empty() {
        chunks.push(chunk.to_string());
    }
}

/// Sentence fragments of `text`, split after `.`, `!` or `?` when followed by
/// whitespace. The whitespace run between two fragments belongs to neither.
fn sentences(text: &str) -> Vec<&str> {
    let mut fragments = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let end = i + c.len_utf8();
        match chars.peek() {
            Some(&(_, next)) if next.is_whitespace() => {}
            _ => continue,
        }
        fragments.push(&text[start..end]);

        start = text.len();
        while let Some(&(j, ws)) = chars.peek() {
            if !ws.is_whitespace() {
                start = j;
                break;
            }
            chars.next();
        }
    }
    if start < text.len() {
        fragments.push(&text[start..]);
    }

    fragments.retain(|f| !f.trim().is_empty());
    fragments
}
