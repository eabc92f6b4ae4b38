pub mod health;
pub mod internal;
pub mod migration;
pub mod security;
