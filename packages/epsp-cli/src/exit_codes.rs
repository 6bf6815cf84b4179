pub const SUCCESS: i32 = 0;
/// Processing failed for every recording, or results could not be written
pub const EXECUTION_ERROR: i32 = 1;
/// Bad configuration or input selection
pub const INPUT_ERROR: i32 = 2;
/// Some recordings failed, the rest were processed
pub const PARTIAL_FAILURE: i32 = 3;
