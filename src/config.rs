// ABOUTME: Constants and limits for the interpreter

#[allow(dead_code)]
pub const VERSION: &str = "1.0.0";

/// Maximum nesting of script-level function calls.
///
/// Each script call frame consumes host stack in the tree-walking evaluator,
/// so runaway recursion must surface as an in-language error before the host
/// stack runs out.
pub const MAX_CALL_DEPTH: usize = 192;
