//! 最小化的 PDF 1.4 写入器：A4 纸张、Helvetica 字体、自动换行与分页。

use std::fmt::Write as _;

const PAGE_WIDTH: f32 = 595.0;
const PAGE_HEIGHT: f32 = 842.0;
const MARGIN: f32 = 50.0;

const TITLE_SIZE: f32 = 18.0;
const TITLE_LEADING: f32 = 24.0;
const TITLE_WRAP: usize = 48;

const BODY_SIZE: f32 = 11.0;
const BODY_LEADING: f32 = 14.0;
const BODY_WRAP: usize = 90;

#[derive(Debug, Clone, PartialEq)]
enum Line {
    Title(String),
    Body(String),
}

impl Line {
    fn leading(&self) -> f32 {
        match self {
            Line::Title(_) => TITLE_LEADING,
            Line::Body(_) => BODY_LEADING,
        }
    }
}

/// 渲染 PDF
pub fn render_pdf(title: &str, content: &str) -> Vec<u8> {
    let mut lines: Vec<Line> = wrap(title, TITLE_WRAP).into_iter().map(Line::Title).collect();
    lines.push(Line::Body(String::new()));
    for paragraph in content.lines() {
        let paragraph = paragraph.replace('\t', "    ");
        lines.extend(wrap(&paragraph, BODY_WRAP).into_iter().map(Line::Body));
    }

    let streams: Vec<String> = paginate(&lines).iter().map(|page| page_stream(page)).collect();
    write_document(title, &streams)
}

/// 按行高分页
fn paginate(lines: &[Line]) -> Vec<Vec<(f32, &Line)>> {
    let mut pages = Vec::new();
    let mut current = Vec::new();
    let mut y = PAGE_HEIGHT - MARGIN;

    for line in lines {
        if y - line.leading() < MARGIN && !current.is_empty() {
            pages.push(std::mem::take(&mut current));
            y = PAGE_HEIGHT - MARGIN;
        }
        y -= line.leading();
        current.push((y, line));
    }

    if !current.is_empty() || pages.is_empty() {
        pages.push(current);
    }
    pages
}

fn page_stream(page: &[(f32, &Line)]) -> String {
    let mut stream = String::new();
    for (y, line) in page {
        let (font, size, text) = match line {
            Line::Title(text) => ("F2", TITLE_SIZE, text),
            Line::Body(text) => ("F1", BODY_SIZE, text),
        };
        if text.is_empty() {
            continue;
        }
        let _ = writeln!(
            stream,
            "BT /{} {} Tf {} {:.1} Td ({}) Tj ET",
            font,
            size,
            MARGIN,
            y,
            escape_text(text)
        );
    }
    stream
}

fn write_document(title: &str, streams: &[String]) -> Vec<u8> {
    let page_count = streams.len();
    // 1 catalog, 2 pages, 3-4 fonts, 5 info，之后每页两个对象
    let kids = (0..page_count)
        .map(|i| format!("{} 0 R", 6 + i * 2))
        .collect::<Vec<_>>()
        .join(" ");

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, page_count),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>"
            .to_string(),
        format!("<< /Title ({}) /Producer (DevMaster) >>", escape_text(title)),
    ];

    for (i, stream) in streams.iter().enumerate() {
        let content_id = 7 + i * 2;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
             /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
            PAGE_WIDTH, PAGE_HEIGHT, content_id
        ));
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}endstream",
            encoded_len(stream),
            stream
        ));
    }

    let mut out: Vec<u8> = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n");

    let mut offsets = Vec::with_capacity(objects.len());
    for (i, object) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
        out.extend(encode(object));
        out.extend_from_slice(b"\nendobj\n");
    }

    let xref_offset = out.len();
    let mut trailer = format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
    for offset in offsets {
        let _ = write!(trailer, "{:010} 00000 n \n", offset);
    }
    let _ = write!(
        trailer,
        "trailer\n<< /Size {} /Root 1 0 R /Info 5 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    );
    out.extend_from_slice(trailer.as_bytes());
    out
}

/// 转为单字节编码：Latin-1 可打印字符原样输出，其余替换为 '?'
fn encode(text: &str) -> impl Iterator<Item = u8> + '_ {
    text.chars().map(|c| match c as u32 {
        0x0A | 0x0D | 0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
        _ => b'?',
    })
}

fn encoded_len(text: &str) -> usize {
    text.chars().count()
}

fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' | '\r' => escaped.push(' '),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// 按单词换行，超长单词强制切分；空行保留为一个空行
fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(word.drain(..width).collect());
        }
        if word.is_empty() {
            continue;
        }

        let word: String = word.into_iter().collect();
        let current_len = current.chars().count();
        let word_len = word.chars().count();
        if current_len > 0 && current_len + 1 + word_len > width {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}
