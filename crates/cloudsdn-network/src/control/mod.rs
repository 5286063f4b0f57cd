//! SDN control plane: flow control tables and the controller.

pub mod controller;
pub mod tables;
