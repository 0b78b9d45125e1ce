pub mod statistics;
pub mod temporal;
