pub mod backend;
pub mod clean;
pub mod collection;
pub mod config;
pub mod convert;
pub mod error;
pub mod gateway;
pub mod merge;
pub mod openapi;
pub mod postman;
pub mod preserve;
pub mod publish;
pub mod scripts;
