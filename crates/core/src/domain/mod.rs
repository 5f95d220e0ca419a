pub mod agent;
pub mod notification;
pub mod request;
