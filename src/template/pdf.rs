//! Minimal PDF writer for text documents.
//!
//! Produces a PDF 1.4 file using the standard Helvetica fonts, a word-wrapped
//! title block followed by word-wrapped body text, paginated on US Letter pages. Output is
//! a pure function of the input: no creation dates or document IDs are
//! embedded, so identical input yields byte-identical files.

const PAGE_WIDTH: u32 = 612;
const PAGE_HEIGHT: u32 = 792;
const MARGIN: u32 = 72;
const TITLE_SIZE: u32 = 16;
const BODY_SIZE: u32 = 11;
const LEADING: u32 = 14;
const TITLE_LEADING: u32 = 20;
/// Characters per wrapped line at the body font size
const WRAP_COLUMNS: usize = 90;
/// Characters per wrapped line at the title font size
const TITLE_WRAP_COLUMNS: usize = 60;
/// Title lines past this are dropped so the first page keeps room for the body
const MAX_TITLE_LINES: usize = 6;

/// Render `title` and `body` into PDF bytes
pub fn write_text_pdf(title: &str, body: &str) -> Vec<u8> {
    let mut title_lines = wrap(title, TITLE_WRAP_COLUMNS);
    title_lines.truncate(MAX_TITLE_LINES);
    let lines = wrap(body, WRAP_COLUMNS);
    let lines_per_page = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;

    let mut pages: Vec<Vec<&str>> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut capacity = lines_per_page - title_block_lines(title_lines.len());
    for line in &lines {
        if current.len() == capacity {
            pages.push(std::mem::take(&mut current));
            capacity = lines_per_page;
        }
        current.push(line.as_str());
    }
    pages.push(current);

    // 1: catalog, 2: page tree, 3-4: fonts, then (page, content) pairs
    let first_page_obj = 5;
    let page_obj = |index: usize| first_page_obj + 2 * index;

    let mut objects: Vec<Vec<u8>> = Vec::new();
    objects.push(b"<< /Type /Catalog /Pages 2 0 R >>".to_vec());

    let kids = (0..pages.len())
        .map(|i| format!("{} 0 R", page_obj(i)))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push(format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, pages.len()).into_bytes());
    objects.push(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    );
    objects.push(
        b"<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
            .to_vec(),
    );

    for (index, page_lines) in pages.iter().enumerate() {
        let title = if index == 0 { title_lines.as_slice() } else { &[] };
        let content = page_content(title, page_lines);
        objects.push(
            format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
                PAGE_WIDTH,
                PAGE_HEIGHT,
                page_obj(index) + 1
            )
            .into_bytes(),
        );

        let mut stream = format!("<< /Length {} >>\nstream\n", content.len()).into_bytes();
        stream.extend_from_slice(&content);
        stream.extend_from_slice(b"\nendstream");
        objects.push(stream);
    }

    serialize(&objects)
}

/// Body lines displaced by a title block of `title_lines` lines plus its gap
fn title_block_lines(title_lines: usize) -> usize {
    let height = title_lines as u32 * TITLE_LEADING + LEADING;
    height.div_ceil(LEADING) as usize
}

fn page_content(title: &[String], lines: &[&str]) -> Vec<u8> {
    let top = PAGE_HEIGHT - MARGIN;
    let mut out = Vec::new();
    out.extend_from_slice(b"BT\n");
    out.extend_from_slice(format!("{} TL\n", LEADING).as_bytes());
    out.extend_from_slice(format!("{} {} Td\n", MARGIN, top).as_bytes());

    if !title.is_empty() {
        out.extend_from_slice(format!("/F2 {} Tf\n", TITLE_SIZE).as_bytes());
        for line in title {
            push_text(&mut out, line);
            out.extend_from_slice(format!(" Tj\n0 -{} Td\n", TITLE_LEADING).as_bytes());
        }
        out.extend_from_slice(format!("0 -{} Td\n", LEADING).as_bytes());
    }

    out.extend_from_slice(format!("/F1 {} Tf\n", BODY_SIZE).as_bytes());
    for line in lines {
        push_text(&mut out, line);
        out.extend_from_slice(b" Tj T*\n");
    }
    out.extend_from_slice(b"ET");
    out
}

/// Write a PDF literal string, mapping text to WinAnsi bytes
fn push_text(out: &mut Vec<u8>, text: &str) {
    out.push(b'(');
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push(b'\\');
                out.push(c as u8);
            }
            c if (c as u32) < 0x20 => {}
            c if (c as u32) <= 0xFF => out.push(c as u32 as u8),
            _ => out.push(b'?'),
        }
    }
    out.push(b')');
}

fn serialize(objects: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (index, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", index + 1).as_bytes());
        out.extend_from_slice(body);
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_offset = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        )
        .as_bytes(),
    );
    out
}

/// Greedy word wrap; words longer than a line are split
fn wrap(text: &str, columns: usize) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut line = String::new();
        let mut line_len = 0;

        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            while word.len() > columns {
                if line_len > 0 {
                    lines.push(std::mem::take(&mut line));
                    line_len = 0;
                }
                let rest = word.split_off(columns);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let needed = if line_len == 0 { word.len() } else { line_len + 1 + word.len() };
            if needed > columns {
                lines.push(std::mem::take(&mut line));
                line_len = 0;
            }
            if line_len > 0 {
                line.push(' ');
                line_len += 1;
            }
            line.extend(word.iter());
            line_len += word.len();
        }

        lines.push(line);
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    #[test]
    fn test_pdf_structure() {
        let pdf = write_text_pdf("Invoice 42", "Total: 10.00");
        let text = as_text(&pdf);
        assert!(pdf.starts_with(b"%PDF-1.4"));
        assert!(text.ends_with("%%EOF\n"));
        assert!(text.contains("(Invoice 42) Tj"));
        assert!(text.contains("(Total: 10.00) Tj"));
        assert!(text.contains("/Count 1"));
    }

    #[test]
    fn test_pdf_is_deterministic() {
        let a = write_text_pdf("Title", "Body line one\nBody line two");
        let b = write_text_pdf("Title", "Body line one\nBody line two");
        assert_eq!(a, b);
    }

    #[test]
    fn test_xref_offsets_point_at_objects() {
        let pdf = write_text_pdf("T", "B");
        // the binary comment line is not UTF-8, so work on raw bytes
        let xref_start = pdf.windows(5).position(|w| w == b"xref\n").unwrap();
        let tail = std::str::from_utf8(&pdf[xref_start..]).unwrap();
        let entries: Vec<usize> = tail
            .lines()
            .skip(3)
            .take_while(|l| l.ends_with(" n "))
            .map(|l| l[..10].parse().unwrap())
            .collect();

        assert_eq!(entries.len(), 6);
        for (index, offset) in entries.iter().enumerate() {
            let expected = format!("{} 0 obj", index + 1);
            assert!(pdf[*offset..].starts_with(expected.as_bytes()));
        }
    }

    #[test]
    fn test_special_characters_escaped() {
        let pdf = write_text_pdf("a (b) \\ c", "");
        assert!(as_text(&pdf).contains("(a \\(b\\) \\\\ c) Tj"));
    }

    #[test]
    fn test_long_body_paginates() {
        let body = (0..200).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        let pdf = write_text_pdf("Long", &body);
        assert!(as_text(&pdf).contains("/Count 5"));
    }

    #[test]
    fn test_long_title_wraps() {
        let title = "Service agreement between Ara Property Management and the tenant of unit 12B";
        let pdf = write_text_pdf(title, "Body");
        let text = as_text(&pdf);

        assert!(!text.contains(&format!("({}) Tj", title)));
        assert!(text.contains("(Service agreement between Ara Property Management and the) Tj"));
        assert!(text.contains("(tenant of unit 12B) Tj"));
        assert!(text.contains("(Body) Tj"));
        assert!(text.contains("/Count 1"));
    }

    #[test]
    fn test_title_block_reserves_body_lines() {
        assert_eq!(title_block_lines(0), 1);
        assert_eq!(title_block_lines(1), 3);
        assert_eq!(title_block_lines(2), 4);

        // a wrapped title pushes the tail of a full first page onto page two
        let lines_per_page = ((PAGE_HEIGHT - 2 * MARGIN) / LEADING) as usize;
        let body = (0..lines_per_page - 3).map(|i| format!("line {}", i)).collect::<Vec<_>>().join("\n");
        assert!(as_text(&write_text_pdf("Short", &body)).contains("/Count 1"));
        let long_title = "word ".repeat(30);
        assert!(as_text(&write_text_pdf(&long_title, &body)).contains("/Count 2"));
    }

    #[test]
    fn test_wrap() {
        let lines = wrap("aaa bbb ccc", 7);
        assert_eq!(lines, vec!["aaa bbb".to_string(), "ccc".to_string()]);

        let lines = wrap("abcdefghij", 4);
        assert_eq!(lines, vec!["abcd", "efgh", "ij"]);

        let lines = wrap("one\n\ntwo", 10);
        assert_eq!(lines, vec!["one", "", "two"]);
    }
}
