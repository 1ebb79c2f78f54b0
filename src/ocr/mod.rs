mod engine;
mod gemini;
mod tesseract;
mod vision;

pub use engine::{OcrEngine, RecognizedText};
pub use gemini::GeminiEngine;
pub use tesseract::TesseractEngine;
