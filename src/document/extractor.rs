use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("The uploaded file is empty")]
    Empty,
    #[error("Could not read PDF: {0}")]
    Unreadable(String),
    #[error("The PDF contains no extractable text")]
    NoText,
}

#[derive(Debug, Clone, Serialize)]
pub struct PageText {
    pub number: usize,
    pub text: String,
}

/// Extracts text from every page, in page order. Pages without text are
/// kept so page numbers stay aligned with the PDF.
pub fn extract_pages(bytes: &[u8]) -> Result<Vec<PageText>, ExtractionError> {
    if bytes.is_empty() {
        return Err(ExtractionError::Empty);
    }
    if !bytes.starts_with(b"%PDF") {
        return Err(ExtractionError::Unreadable("missing %PDF header".to_string()));
    }

    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractionError::Unreadable(e.to_string()))?;

    let pages: Vec<PageText> = pages
        .into_iter()
        .enumerate()
        .map(|(i, text)| PageText { number: i + 1, text })
        .collect();

    if pages.iter().all(|p| p.text.trim().is_empty()) {
        return Err(ExtractionError::NoText);
    }

    log::debug!("Extracted {} pages", pages.len());
    Ok(pages)
}

/// Runs extraction off the async runtime. A panic inside the PDF parser is
/// reported as an unreadable document.
pub async fn extract_pages_blocking(bytes: Vec<u8>) -> Result<Vec<PageText>, ExtractionError> {
    tokio::task::spawn_blocking(move || extract_pages(&bytes))
        .await
        .map_err(|e| ExtractionError::Unreadable(format!("PDF parser failed: {}", e)))?
}

pub fn join_pages(pages: &[PageText]) -> String {
    let mut text = String::new();
    for page in pages {
        text.push_str(&page.text);
        text.push('\n');
    }
    text
}

/// Builds a minimal PDF with one Helvetica text line per page.
#[cfg(test)]
pub(crate) fn build_test_pdf(pages: &[&str]) -> Vec<u8> {
    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            (0..pages.len()).map(|i| format!("{} 0 R", 4 + 2 * i)).collect::<Vec<_>>().join(" "),
            pages.len()
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_string(),
    ];
    for (i, text) in pages.iter().enumerate() {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents {} 0 R \
             /Resources << /Font << /F1 3 0 R >> >> >>",
            5 + 2 * i
        ));
        let stream = format!("BT /F1 24 Tf 72 720 Td ({}) Tj ET", text);
        objects.push(format!("<< /Length {} >>\nstream\n{}\nendstream", stream.len(), stream));
    }

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }

    let xref = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        pdf.push_str(&format!("{:010} 00000 n \n", offset));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref
    ));
    pdf.into_bytes()
}
