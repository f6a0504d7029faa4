#![allow(dead_code)]

pub mod mock_platform;
pub mod socket_guard;
