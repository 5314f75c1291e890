pub mod call;
pub mod events;
pub mod presence;
