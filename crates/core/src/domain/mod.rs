pub mod driver;
pub mod guest;
pub mod hotel;
pub mod message;
pub mod reminder;
pub mod ride;
