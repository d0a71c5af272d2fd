pub mod html;
pub mod pdf;

pub use html::render_html;
pub use pdf::{find_browser, render_pdf};

pub const HTML_FILE: &str = "srag_report.html";
pub const PDF_FILE: &str = "srag_report.pdf";
