pub mod baseline;
pub mod contract;
pub mod history;
