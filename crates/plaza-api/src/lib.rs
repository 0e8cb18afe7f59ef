pub mod auth;
pub mod error;
pub mod flash;
pub mod health;
pub mod meta;
pub mod middleware;
pub mod notices;
pub mod passwords;
pub mod teams;
