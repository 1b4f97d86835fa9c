use tracing::warn;

/// Longest message the chat platform accepts, in characters.
pub const MAX_MESSAGE_LEN: usize = 2000;

pub fn render_line(label: &str, body: &str) -> String {
    format!("{}: {}\n", label, body)
}

/// Packs labeled entries into as few messages as possible without splitting
/// an entry across two messages. An entry longer than `max_len` on its own
/// gets a message to itself, uncut.
pub fn paginate<L, B>(entries: &[(L, B)], max_len: usize) -> Vec<String>
where
    L: AsRef<str>,
    B: AsRef<str>,
{
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for (label, body) in entries {
        let line = render_line(label.as_ref(), body.as_ref());
        let line_len = line.chars().count();
        if line_len > max_len {
            warn!(
                "Entry {} is {} chars, over the {} char message limit",
                label.as_ref(),
                line_len,
                max_len
            );
        }
        if !current.is_empty() && current_len + line_len > max_len {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(&line);
        current_len += line_len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(bodies: &[String]) -> Vec<(String, String)> {
        bodies
            .iter()
            .enumerate()
            .map(|(i, b)| (crate::glyph::selector_label(i), b.clone()))
            .collect()
    }

    #[test]
    fn short_list_fits_one_chunk() {
        let chunks = paginate(&entries(&["one".into(), "two".into()]), MAX_MESSAGE_LEN);
        assert_eq!(chunks, vec!["A: one\nB: two\n".to_string()]);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let none: Vec<(String, String)> = Vec::new();
        assert!(paginate(&none, MAX_MESSAGE_LEN).is_empty());
    }

    #[test]
    fn chunks_respect_limit_and_concatenate_back() {
        let bodies: Vec<String> = (0..17).map(|i| "x".repeat(150 + i * 20)).collect();
        let input = entries(&bodies);
        let chunks = paginate(&input, MAX_MESSAGE_LEN);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= MAX_MESSAGE_LEN);
        }
        let expected: String = input.iter().map(|(l, b)| render_line(l, b)).collect();
        assert_eq!(chunks.concat(), expected);
    }

    #[test]
    fn line_exactly_at_limit_is_kept_whole() {
        // "A: " + body + "\n" == 2000
        let body = "y".repeat(MAX_MESSAGE_LEN - 4);
        let chunks = paginate(&entries(&[body.clone(), "z".into()]), MAX_MESSAGE_LEN);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), MAX_MESSAGE_LEN);
        assert_eq!(chunks[1], "B: z\n");
    }

    #[test]
    fn oversized_line_gets_its_own_chunk() {
        let huge = "w".repeat(MAX_MESSAGE_LEN + 10);
        let chunks = paginate(
            &entries(&["small".into(), huge.clone(), "tail".into()]),
            MAX_MESSAGE_LEN,
        );
        assert_eq!(
            chunks,
            vec![
                "A: small\n".to_string(),
                format!("B: {}\n", huge),
                "C: tail\n".to_string(),
            ]
        );
    }

    #[test]
    fn limit_counts_characters_not_bytes() {
        // two lines of 994 chars fit together; their byte length would not
        let body = "\u{e9}".repeat(990);
        let chunks = paginate(&entries(&[body.clone(), body]), MAX_MESSAGE_LEN);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].len() > MAX_MESSAGE_LEN);
    }
}
