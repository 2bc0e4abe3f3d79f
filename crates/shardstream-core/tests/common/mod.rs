#![allow(dead_code)]

pub mod shard_server;
