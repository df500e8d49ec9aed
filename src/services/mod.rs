pub(crate) mod grading;
pub(crate) mod scoring;
