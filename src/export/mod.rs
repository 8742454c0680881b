pub mod docx;
pub mod pdf;

use crate::error::DevMasterError;
use crate::types::body::ExportBody;
use crate::Result;
use tracing::debug;

const DEFAULT_TITLE: &str = "document";

/// 导出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Pdf,
    Docx,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Docx => "docx",
        }
    }
}

/// 导出的文件
#[derive(Debug, Clone)]
pub struct ExportedDocument {
    pub filename: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

/// 将标题和正文渲染为指定格式
pub fn export(format: ExportFormat, body: &ExportBody) -> Result<ExportedDocument> {
    if body.content.trim().is_empty() {
        return Err(DevMasterError::validation("content 不能为空"));
    }

    let title = match body.title.trim() {
        "" => DEFAULT_TITLE,
        title => title,
    };

    let bytes = match format {
        ExportFormat::Pdf => pdf::render_pdf(title, &body.content),
        ExportFormat::Docx => docx::render_docx(title, &body.content)?,
    };
    debug!(format = format.extension(), size = bytes.len(), "导出文档");

    Ok(ExportedDocument {
        filename: format!("{}.{}", slugify(title), format.extension()),
        content_type: format.content_type(),
        bytes,
    })
}

/// 生成适合 Content-Disposition 的文件名
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let slug: String = slug.trim_matches('-').chars().take(60).collect();
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        slug.to_string()
    }
}
