pub mod generation;
pub mod images;
pub mod jobs;
pub mod publish;
pub mod scheduler;
