pub mod hydrophones;
pub mod scenario;
