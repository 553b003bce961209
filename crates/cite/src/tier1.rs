//! Tier-1 exact matching: locate a verbatim quote as a contiguous OCR word
//! subsequence and merge the word boxes into per-line rectangles.

use domain::{BoundingBox, CitationSpan, OcrWord};

/// Normalize one token: lowercase, with leading/trailing punctuation
/// stripped. Interior punctuation (hyphens, decimal points) stays.
pub fn normalize_token(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

/// Tokenize free text the same way OCR words are normalized.
pub fn normalize_text(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(normalize_token)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Find the first contiguous run of OCR words whose normalized concatenation
/// equals the normalized verbatim text. Returns the matched slice.
pub fn find_word_sequence<'a>(words: &'a [OcrWord], verbatim_text: &str) -> Option<&'a [OcrWord]> {
    let target = normalize_text(verbatim_text);
    if target.is_empty() || words.len() < target.len() {
        return None;
    }
    let normalized: Vec<String> = words.iter().map(|w| normalize_token(&w.text)).collect();

    'outer: for start in 0..=(normalized.len() - target.len()) {
        for (offset, expected) in target.iter().enumerate() {
            if &normalized[start + offset] != expected {
                continue 'outer;
            }
        }
        return Some(&words[start..start + target.len()]);
    }
    None
}

/// Merge matched word boxes into one span per page, with one rectangle per
/// text line (adjacent words on a line merge horizontally).
pub fn merge_word_boxes(words: &[OcrWord]) -> Vec<CitationSpan> {
    let mut spans: Vec<CitationSpan> = Vec::new();

    for word in words {
        let word_box = BoundingBox {
            x0: word.x0,
            y0: word.y0,
            x1: word.x1,
            y1: word.y1,
        };
        let span = match spans.iter_mut().find(|s| s.page_number == word.page_number) {
            Some(span) => span,
            None => {
                spans.push(CitationSpan {
                    page_number: word.page_number,
                    bounding_boxes: Vec::new(),
                    text_content: None,
                });
                spans.last_mut().expect("span just pushed")
            }
        };

        match span
            .bounding_boxes
            .iter_mut()
            .find(|b| same_line(b, &word_box))
        {
            Some(line_box) => *line_box = line_box.union(&word_box),
            None => span.bounding_boxes.push(word_box),
        }
    }

    for span in &mut spans {
        let text: Vec<&str> = words
            .iter()
            .filter(|w| w.page_number == span.page_number)
            .map(|w| w.text.as_str())
            .collect();
        span.text_content = Some(text.join(" "));
    }
    spans
}

/// Two boxes share a line when their vertical centers fall within the other
/// box's vertical extent.
fn same_line(a: &BoundingBox, b: &BoundingBox) -> bool {
    let a_center = (a.y0 + a.y1) / 2.0;
    let b_center = (b.y0 + b.y1) / 2.0;
    (a_center >= b.y0 && a_center <= b.y1) || (b_center >= a.y0 && b_center <= a.y1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn word(text: &str, page: i32, index: i32, x0: f64, y0: f64) -> OcrWord {
        OcrWord {
            id: Uuid::new_v4(),
            document_id: Uuid::nil(),
            page_number: page,
            word_index: index,
            text: text.to_string(),
            x0,
            y0,
            x1: x0 + 40.0,
            y1: y0 + 12.0,
            confidence: Some(0.99),
        }
    }

    fn line(texts: &[&str], page: i32, y0: f64) -> Vec<OcrWord> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| word(t, page, i as i32, 72.0 + i as f64 * 50.0, y0))
            .collect()
    }

    #[test]
    fn normalization_strips_case_and_edge_punctuation() {
        assert_eq!(normalize_token("Insured:"), "insured");
        assert_eq!(normalize_token("POL-8888"), "pol-8888");
        assert_eq!(normalize_text("Acme  Insurance Co."), vec!["acme", "insurance", "co"]);
    }

    #[test]
    fn finds_exact_sequence_despite_punctuation() {
        let words = line(&["Policy", "Number", "POL-8888", "issued", "by", "Acme"], 1, 700.0);
        let matched = find_word_sequence(&words, "Policy Number POL-8888").unwrap();
        assert_eq!(matched.len(), 3);
        assert_eq!(matched[0].text, "Policy");
        assert_eq!(matched[2].text, "POL-8888");
    }

    #[test]
    fn misses_non_contiguous_text() {
        let words = line(&["Policy", "Number", "POL-8888"], 1, 700.0);
        assert!(find_word_sequence(&words, "Policy POL-8888").is_none());
        assert!(find_word_sequence(&words, "never present").is_none());
        assert!(find_word_sequence(&words, "").is_none());
    }

    #[test]
    fn merges_one_line_into_one_box() {
        let words = line(&["Named", "Insured", "Tech"], 1, 650.0);
        let spans = merge_word_boxes(&words);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].bounding_boxes.len(), 1);
        let b = spans[0].bounding_boxes[0];
        assert_eq!(b.x0, 72.0);
        assert!(b.x1 > 150.0);
        assert_eq!(spans[0].text_content.as_deref(), Some("Named Insured Tech"));
    }

    #[test]
    fn separate_lines_get_separate_boxes() {
        let mut words = line(&["first", "line"], 1, 650.0);
        words.extend(line(&["second", "line"], 1, 600.0));
        let spans = merge_word_boxes(&words);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].bounding_boxes.len(), 2);
    }

    #[test]
    fn words_across_pages_get_separate_spans() {
        let mut words = line(&["end", "of", "page"], 1, 72.0);
        words.extend(line(&["start", "of", "next"], 2, 720.0));
        let spans = merge_word_boxes(&words);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[0].page_number, 1);
        assert_eq!(spans[1].page_number, 2);
    }
}
