use std::collections::BTreeMap;

use crate::ocr::{RawLine, Token};

/// hOCR classes that carry one line of words.
const LINE_CLASSES: [&str; 4] = ["ocr_line", "ocr_caption", "ocr_header", "ocr_textfloat"];

pub(super) fn parse_tsv_lines(tsv: &str) -> Vec<RawLine> {
    let mut groups: BTreeMap<(i32, i32, i32, i32), Vec<Token>> = BTreeMap::new();

    for row in tsv.lines().skip(1) {
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        let confidence: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || confidence < 0.0 {
            continue;
        }
        groups.entry(key).or_default().push(Token {
            text: text.to_string(),
            left: cols[6].parse().unwrap_or(0),
            top: cols[7].parse().unwrap_or(0),
            width: cols[8].parse().unwrap_or(0),
            height: cols[9].parse().unwrap_or(0),
            confidence,
        });
    }

    let mut lines = groups
        .into_values()
        .filter_map(|mut tokens| {
            tokens.sort_by_key(|token| token.left);
            RawLine::from_tokens(tokens)
        })
        .collect::<Vec<_>>();
    lines.sort_by_key(|line| line.top);
    lines
}

pub(super) fn parse_hocr_lines(hocr: &str) -> Vec<RawLine> {
    let mut lines = Vec::new();
    let bytes = hocr.as_bytes();
    let mut i = 0usize;
    while let Some(start) = find_subslice(bytes, b"<span", i) {
        let Some(tag_end) = find_byte(bytes, b'>', start) else {
            break;
        };
        let tag = &hocr[start..tag_end];
        if !is_line_tag(tag) {
            i = tag_end + 1;
            continue;
        }
        let Some((inner_start, inner_end)) = find_span_inner(bytes, tag_end + 1) else {
            break;
        };
        let mut tokens = parse_hocr_words(&hocr[inner_start..inner_end]);
        tokens.sort_by_key(|token| token.left);
        if let Some(line) = RawLine::from_tokens(tokens) {
            lines.push(line);
        }
        i = inner_end + "</span>".len();
    }
    lines.sort_by_key(|line| line.top);
    lines
}

fn is_line_tag(tag: &str) -> bool {
    extract_attr(tag, "class")
        .map(|class| {
            class
                .split_whitespace()
                .any(|name| LINE_CLASSES.contains(&name))
        })
        .unwrap_or(false)
}

fn find_subslice(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|win| win == needle)
        .map(|pos| from + pos)
}

fn find_byte(haystack: &[u8], needle: u8, from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .iter()
        .position(|b| *b == needle)
        .map(|pos| from + pos)
}

fn find_span_inner(bytes: &[u8], start: usize) -> Option<(usize, usize)> {
    let mut depth = 1i32;
    let mut i = start;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            if bytes[i..].starts_with(b"<span") {
                depth += 1;
            } else if bytes[i..].starts_with(b"</span") {
                depth -= 1;
                if depth == 0 {
                    return Some((start, i));
                }
            }
        }
        i += 1;
    }
    None
}

fn extract_attr(tag: &str, name: &str) -> Option<String> {
    let needle = format!("{}=", name);
    let idx = tag.find(&needle)?;
    let rest = &tag[idx + needle.len()..];
    let quote = rest.chars().next().filter(|ch| *ch == '"' || *ch == '\'')?;
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(rest[..end].to_string())
}

fn strip_tags(value: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in value.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

fn decode_entities(value: &str) -> String {
    let named = value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", "\u{00a0}");
    decode_numeric_entities(&named).replace("&amp;", "&")
}

/// Decodes `&#NNN;` and `&#xHH;` references; tesseract emits them for
/// currency symbols.
fn decode_numeric_entities(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(idx) = rest.find("&#") {
        out.push_str(&rest[..idx]);
        let tail = &rest[idx + 2..];
        let decoded = tail.find(';').and_then(|end| {
            let body = &tail[..end];
            let code = match body.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok(),
                None => body.parse::<u32>().ok(),
            };
            code.and_then(char::from_u32).map(|ch| (ch, end))
        });
        match decoded {
            Some((ch, end)) => {
                out.push(ch);
                rest = &tail[end + 1..];
            }
            None => {
                out.push_str("&#");
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

fn parse_hocr_words(inner: &str) -> Vec<Token> {
    let bytes = inner.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;
    while let Some(start) = find_subslice(bytes, b"<span", i) {
        let Some(tag_end) = find_byte(bytes, b'>', start) else {
            break;
        };
        let tag = &inner[start..tag_end];
        if !tag.contains("ocrx_word") {
            i = tag_end + 1;
            continue;
        }
        let Some((inner_start, inner_end)) = find_span_inner(bytes, tag_end + 1) else {
            break;
        };
        let text = decode_entities(&strip_tags(&inner[inner_start..inner_end]))
            .replace('\u{00a0}', " ");
        let text = text.trim();
        if let Some((left, top, width, height)) = parse_hocr_bbox_from_title(tag) {
            if !text.is_empty() {
                tokens.push(Token {
                    text: text.to_string(),
                    left,
                    top,
                    width,
                    height,
                    confidence: parse_hocr_conf_from_title(tag).unwrap_or(-1.0),
                });
            }
        }
        i = inner_end + "</span>".len();
    }
    tokens
}

fn parse_hocr_bbox_from_title(tag: &str) -> Option<(u32, u32, u32, u32)> {
    let title = extract_attr(tag, "title")?;
    let bbox_idx = title.find("bbox")?;
    let nums = title[bbox_idx + 4..]
        .split([' ', ';'])
        .filter(|v| !v.is_empty())
        .take(4)
        .filter_map(|v| v.parse::<u32>().ok())
        .collect::<Vec<_>>();
    let [x1, y1, x2, y2] = nums[..] else {
        return None;
    };
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some((x1, y1, x2 - x1, y2 - y1))
}

fn parse_hocr_conf_from_title(tag: &str) -> Option<f32> {
    let title = extract_attr(tag, "title")?;
    let idx = title.find("x_wconf")?;
    let rest = &title[idx + "x_wconf".len()..];
    let value = rest.split([' ', ';']).find(|v| !v.is_empty())?;
    value.parse::<f32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOCR: &str = r#"<div class='ocr_page' title='bbox 0 0 800 600'>
 <span class='ocr_line' id='line_1_2' title="bbox 40 120 620 150; baseline 0 -6; x_size 28">
  <span class='ocrx_word' id='word_1_3' title='bbox 40 120 120 150; x_wconf 91'>2x</span>
  <span class='ocrx_word' id='word_1_4' title='bbox 130 120 300 150; x_wconf 88'>Paneer</span>
  <span class='ocrx_word' id='word_1_5' title='bbox 560 120 620 150; x_wconf 95'>&#8377;240</span>
 </span>
 <span class='ocr_header' id='line_1_1' title="bbox 200 20 600 60">
  <span class='ocrx_word' id='word_1_1' title='bbox 200 20 380 60; x_wconf 73'><strong>Tom</strong></span>
  <span class='ocrx_word' id='word_1_2' title='bbox 390 20 600 60; x_wconf 70'>&amp;&nbsp;Jerry</span>
 </span>
 <span class='ocr_line' id='line_1_9' title="bbox 0 300 10 310">
  <span class='ocrx_word' id='word_1_9' title='bbox 0 300 0 310; x_wconf 10'>.</span>
 </span>
</div>"#;

    #[test]
    fn hocr_lines_are_sorted_and_tokenised() {
        let lines = parse_hocr_lines(HOCR);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Tom & Jerry");
        assert_eq!(lines[1].tokens.len(), 3);
        assert_eq!(lines[1].tokens[0].text, "2x");
        assert_eq!(lines[1].tokens[1].confidence, 88.0);
        assert_eq!((lines[1].left, lines[1].right), (40, 620));
        assert_eq!(lines[1].last_token().map(|t| t.text.as_str()), Some("\u{20b9}240"));
    }

    #[test]
    fn tsv_words_group_by_line_key() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
1\t1\t0\t0\t0\t0\t0\t0\t800\t600\t-1\t\n\
5\t1\t1\t1\t2\t1\t300\t80\t60\t20\t91.5\t120\n\
5\t1\t1\t1\t2\t2\t10\t80\t90\t20\t87\tDosa\n\
5\t1\t1\t1\t1\t1\t10\t20\t120\t24\t64\tSaravana\n\
5\t1\t1\t1\t3\t1\t10\t140\t50\t20\t-1\t \n";
        let lines = parse_tsv_lines(tsv);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "Saravana");
        assert_eq!(lines[1].text, "Dosa 120");
        assert_eq!(lines[1].max_token_confidence(), Some(91.5));
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(decode_entities("&#x20B9;90 &amp; up"), "\u{20b9}90 & up");
        assert_eq!(decode_entities("&#bad; &amp;#39;"), "&#bad; &#39;");
    }

    #[test]
    fn malformed_bbox_is_ignored() {
        assert_eq!(parse_hocr_bbox_from_title("title='bbox 5 5 2 9'"), None);
        assert_eq!(
            parse_hocr_bbox_from_title("title='bbox 1 2 11 22; x_wconf 50'"),
            Some((1, 2, 10, 20))
        );
        assert_eq!(parse_hocr_conf_from_title("title='bbox 1 2 11 22; x_wconf 50'"), Some(50.0));
    }
}
