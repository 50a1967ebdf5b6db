pub mod delimiters;
pub mod patterns;
pub mod semantics;
pub mod structure;

pub use delimiters::DelimiterScanner;
pub use patterns::PatternLibrary;
pub use semantics::SemanticHeuristics;
pub use structure::StructuralAnalyzer;
