pub mod features;
pub mod run;
pub mod validate;
