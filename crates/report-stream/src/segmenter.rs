//! Splits oversized content into bounded, paragraph-aligned segments so the
//! reveal time of any single display event stays bounded.

/// One bounded slice of a larger content block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueuedSegment {
    pub parent_title: String,
    /// 0-based position within the parent.
    pub ordinal: usize,
    /// Display title; continuation segments carry a suffix.
    pub title: String,
    /// Trimmed text, at most `max_len` characters.
    pub text: String,
}

/// Title used for the segment at `ordinal`.
pub fn segment_title(parent_title: &str, ordinal: usize) -> String {
    if ordinal == 0 {
        parent_title.to_string()
    } else {
        format!("{parent_title} (continued {ordinal})")
    }
}

/// Splits `content` into segments of at most `max_len` characters.
///
/// Paragraphs (separated by blank lines) are packed greedily; a paragraph that
/// is longer than `max_len` on its own is cut into fixed windows. Blank content
/// yields no segments. `max_len == 0` disables splitting.
pub fn segment(title: &str, content: &str, max_len: usize) -> Vec<QueuedSegment> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    if max_len == 0 {
        return vec![make_segment(title, 0, trimmed.to_string())];
    }

    let mut texts: Vec<String> = Vec::new();
    let mut buffer = String::new();
    let mut buffer_len = 0_usize;

    for paragraph in paragraphs(trimmed) {
        let paragraph_len = paragraph.chars().count();
        if paragraph_len > max_len {
            if !buffer.is_empty() {
                texts.push(std::mem::take(&mut buffer));
                buffer_len = 0;
            }
            texts.extend(hard_slice(&paragraph, max_len));
            continue;
        }

        let joined_len = if buffer.is_empty() {
            paragraph_len
        } else {
            buffer_len + 2 + paragraph_len
        };
        if joined_len > max_len {
            texts.push(std::mem::take(&mut buffer));
            buffer = paragraph;
            buffer_len = paragraph_len;
        } else {
            if !buffer.is_empty() {
                buffer.push_str("\n\n");
            }
            buffer.push_str(&paragraph);
            buffer_len = joined_len;
        }
    }
    if !buffer.is_empty() {
        texts.push(buffer);
    }

    texts
        .into_iter()
        .enumerate()
        .map(|(ordinal, text)| make_segment(title, ordinal, text))
        .collect()
}

fn make_segment(title: &str, ordinal: usize, text: String) -> QueuedSegment {
    QueuedSegment {
        parent_title: title.to_string(),
        ordinal,
        title: segment_title(title, ordinal),
        text,
    }
}

/// Paragraphs separated by whitespace-only lines, each trimmed and non-empty.
fn paragraphs(content: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            flush_paragraph(&mut current, &mut out);
        } else {
            current.push(line);
        }
    }
    flush_paragraph(&mut current, &mut out);
    out
}

fn flush_paragraph(lines: &mut Vec<&str>, out: &mut Vec<String>) {
    if lines.is_empty() {
        return;
    }
    let paragraph = lines.join("\n");
    lines.clear();
    let paragraph = paragraph.trim();
    if !paragraph.is_empty() {
        out.push(paragraph.to_string());
    }
}

fn hard_slice(paragraph: &str, max_len: usize) -> Vec<String> {
    let chars: Vec<char> = paragraph.chars().collect();
    chars
        .chunks(max_len)
        .map(|window| window.iter().collect::<String>().trim().to_string())
        .filter(|window| !window.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn squash(text: &str) -> String {
        text.chars().filter(|c| !c.is_whitespace()).collect()
    }

    fn rejoined(segments: &[QueuedSegment]) -> String {
        segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    #[test]
    fn blank_content_yields_no_segments() {
        assert!(segment("data", "", 540).is_empty());
        assert!(segment("data", " \n\n\t ", 540).is_empty());
    }

    #[test]
    fn short_content_is_a_single_untitled_segment() {
        let segments = segment("data", "  one paragraph  ", 540);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].title, "data");
        assert_eq!(segments[0].ordinal, 0);
        assert_eq!(segments[0].text, "one paragraph");
    }

    #[test]
    fn packs_paragraphs_until_the_next_would_overflow() {
        let content = "aaaa\n\nbbbb\n\ncccc";
        let segments = segment("p", content, 10);
        let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["aaaa\n\nbbbb", "cccc"]);
        assert_eq!(segments[1].title, "p (continued 1)");
        assert_eq!(segments[1].parent_title, "p");
    }

    #[test]
    fn oversized_paragraph_is_hard_sliced() {
        let content = format!("intro\n\n{}", "x".repeat(25));
        let segments = segment("p", &content, 10);
        let lens: Vec<usize> = segments.iter().map(|s| s.text.chars().count()).collect();
        assert_eq!(lens, vec![5, 10, 10, 5]);
        let ordinals: Vec<usize> = segments.iter().map(|s| s.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2, 3]);
    }

    #[test]
    fn slicing_respects_char_boundaries() {
        let content = "数据分析".repeat(5);
        let segments = segment("数据", &content, 6);
        assert!(segments.iter().all(|s| s.text.chars().count() <= 6));
        assert_eq!(squash(&rejoined(&segments)), squash(&content));
    }

    #[test]
    fn six_hundred_chars_split_in_two_at_a_paragraph_boundary() {
        let content = format!("{}\n\n{}", "a".repeat(300), "b".repeat(298));
        assert_eq!(content.chars().count(), 600);
        let segments = segment("data", &content, 540);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].text, "a".repeat(300));
        assert_eq!(segments[1].text, "b".repeat(298));
    }

    #[test]
    fn round_trip_preserves_content_modulo_whitespace() {
        let many_words = "word ".repeat(200);
        let many_paragraphs = "short\n\n".repeat(50);
        let samples = [
            "single line",
            "para one\nstill one\n\npara two\n\n\n\npara three",
            "  leading and trailing  \n\n  ",
            many_words.as_str(),
            many_paragraphs.as_str(),
        ];
        for content in samples {
            for max_len in [1, 3, 7, 40, 540] {
                let segments = segment("t", content, max_len);
                assert!(
                    segments.iter().all(|s| s.text.chars().count() <= max_len),
                    "segment over {max_len} chars"
                );
                assert_eq!(squash(&rejoined(&segments)), squash(content));
            }
        }
    }

    #[test]
    fn zero_limit_disables_splitting() {
        let content = "a\n\nb";
        let segments = segment("t", content, 0);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].text, "a\n\nb");
    }
}
