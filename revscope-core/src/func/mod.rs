//! Function extraction for decompiled C.
//!
//! # Components
//!
//! - `extractor`: recognizes definitions over scanner tokens and builds
//!   [`FunctionRecord`]s with their calls and complexity metrics
//!
//! # Example Usage
//!
//! ```ignore
//! use revscope_core::func::{extract_functions, assign_ordinals};
//! use revscope_core::lexer::scan;
//!
//! let tokens = scan(&text);
//! let mut records = extract_functions(&text, &tokens, 0);
//! assign_ordinals(records.iter_mut());
//!
//! for r in &records {
//!     println!("{} at line {} ({} calls)", r.key(), r.header_line(), r.call_sites());
//! }
//! ```

pub mod extractor;

pub use extractor::{
    assign_ordinals, extract_functions, fragment_record, is_definition_at, FunctionRecord,
};
