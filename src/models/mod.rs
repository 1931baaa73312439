pub mod enums;
pub mod medication;
pub mod reminder;
pub mod user;

pub use medication::*;
pub use reminder::*;
pub use user::*;
