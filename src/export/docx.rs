use crate::Result;
use quick_xml::escape::escape;
use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

/// 渲染 DOCX（WordprocessingML 最小包）
pub fn render_docx(title: &str, content: &str) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file("[Content_Types].xml", options)?;
    zip.write_all(CONTENT_TYPES.as_bytes())?;

    zip.start_file("_rels/.rels", options)?;
    zip.write_all(ROOT_RELS.as_bytes())?;

    zip.start_file("word/document.xml", options)?;
    zip.write_all(document_xml(title, content).as_bytes())?;

    let cursor = zip.finish()?;
    Ok(cursor.into_inner())
}

fn document_xml(title: &str, content: &str) -> String {
    let mut xml = String::from(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
    );

    // 标题：加粗 18pt
    xml.push_str(r#"<w:p><w:r><w:rPr><w:b/><w:sz w:val="36"/></w:rPr><w:t xml:space="preserve">"#);
    xml.push_str(&escape_xml(title));
    xml.push_str("</w:t></w:r></w:p>");

    for line in content.lines() {
        xml.push_str(r#"<w:p><w:r><w:t xml:space="preserve">"#);
        xml.push_str(&escape_xml(line));
        xml.push_str("</w:t></w:r></w:p>");
    }

    xml.push_str("</w:body></w:document>");
    xml
}

fn escape_xml(text: &str) -> String {
    let mut cleaned = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\t' => cleaned.push_str("    "),
            // XML 1.0 不允许的控制字符
            c if (c as u32) < 0x20 => {}
            c => cleaned.push(c),
        }
    }
    escape(cleaned.as_str()).into_owned()
}
