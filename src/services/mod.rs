pub mod ai;
pub mod backend;
pub mod catalog;
pub mod conversation;
pub mod interactions;
pub mod matcher;
pub mod registry;
pub mod scheduling;
pub mod sessions;
pub mod text;
