pub mod extractor;

pub use extractor::extract_invoice_from_image;
