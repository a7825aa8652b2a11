mod extractor;
mod normalizer;
mod pipeline;

pub use extractor::{
    ExtractError, ExtractResult, Extractor, ExtractorFormat, GutenbergHtmlExtractor,
};
pub use normalizer::{is_material, normalize, normalize_prose, MATERIALITY_THRESHOLD};
pub use pipeline::{ExtractJob, ExtractReport, ExtractedFile, PlannedExtraction};
