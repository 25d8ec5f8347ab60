// Crate root: declare modules and control visibility
pub mod aggregator;
pub mod analysis;
pub mod assembly;
pub mod debug;
pub mod error;
pub mod findings;
pub mod highlight;
pub mod intermediate_asm;
pub mod line_info;
pub mod machine_asm;
pub mod occurrence;
pub mod report;
pub mod result_index;
pub mod tokens;
pub mod utils;
pub mod views;

// Re-export commonly used API from the library for binaries/tests
pub use analysis::AnalysisKind;
pub use error::{IndexError, Result};
pub use result_index::{IndexHandle, ResultIndex, ResultInputs};
