pub mod ids;
pub mod staff;
pub mod ticket;
pub mod timestamp;
