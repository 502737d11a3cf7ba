#![allow(async_fn_in_trait)]

pub mod config;
pub mod decode;
pub mod error;
pub mod extractors;
pub mod fetch;
pub mod page;
pub mod pipeline;
pub mod playlist;
