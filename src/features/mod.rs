pub mod elo;
pub mod engineering;
pub mod form;
